use serde::Serialize;

/// Why a search could not commit to one subset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AmbiguityReason {
    TiedSolutions,
    SearchCapHit,
    TiedAndCapHit,
}

/// Outcome of fitting one charge to a subset of an order's items.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Combination {
    /// Indices into the caller's item slice, ascending.
    Found(Vec<usize>),
    NoMatch,
    Ambiguous { solutions: usize, reason: AmbiguityReason },
}

fn ambiguity_reason(num_solutions: usize, cap_hit: bool) -> Option<AmbiguityReason> {
    match (num_solutions > 1, cap_hit) {
        (true, true) => Some(AmbiguityReason::TiedAndCapHit),
        (true, false) => Some(AmbiguityReason::TiedSolutions),
        (false, true) => Some(AmbiguityReason::SearchCapHit),
        (false, false) => None,
    }
}

/// Upper bound on solutions collected before the walk stops.
const MAX_SOLUTIONS: usize = 16;

// ---------------------------------------------------------------------------
// Public entry point
// ---------------------------------------------------------------------------

/// Find the unique subset of `item_cents` that sums to `target_cents`.
///
/// The whole set wins outright when it sums to the target. Otherwise single
/// items are tried first, then a bounded depth-first walk. Items priced at
/// zero or below can't take part in a subset; they'd only multiply equivalent
/// solutions.
pub fn find_combination(target_cents: i64, item_cents: &[i64], max_nodes: usize) -> Combination {
    let items_total: i64 = item_cents.iter().sum();
    if !item_cents.is_empty() && items_total == target_cents {
        return Combination::Found((0..item_cents.len()).collect());
    }

    // (original index, cents), ascending by price; sort is stable so equal
    // prices keep their original order.
    let mut eligible: Vec<(usize, i64)> = item_cents
        .iter()
        .copied()
        .enumerate()
        .filter(|&(_, c)| c > 0 && c <= target_cents)
        .collect();
    eligible.sort_by_key(|&(_, c)| c);

    let singles: Vec<usize> = eligible.iter().filter(|&&(_, c)| c == target_cents).map(|&(i, _)| i).collect();
    match singles.len() {
        0 => {}
        1 => return Combination::Found(singles),
        n => {
            return Combination::Ambiguous {
                solutions: n,
                reason: AmbiguityReason::TiedSolutions,
            }
        }
    }

    let amounts: Vec<i64> = eligible.iter().map(|&(_, c)| c).collect();
    let search = subset_sum_search(&amounts, target_cents, max_nodes);
    log::debug!(
        "combination search for {target_cents}: {} nodes, {} pruned, {} solutions, cap_hit={}",
        search.nodes_visited,
        search.nodes_pruned,
        search.solutions.len(),
        search.cap_hit
    );

    if let Some(reason) = ambiguity_reason(search.solutions.len(), search.cap_hit) {
        return Combination::Ambiguous {
            solutions: search.solutions.len(),
            reason,
        };
    }
    match search.solutions.into_iter().next() {
        Some(subset) => {
            let mut indices: Vec<usize> = subset.into_iter().map(|k| eligible[k].0).collect();
            indices.sort_unstable();
            Combination::Found(indices)
        }
        None => Combination::NoMatch,
    }
}

// ---------------------------------------------------------------------------
// Subset-sum search (bounded DFS over ascending amounts)
// ---------------------------------------------------------------------------

struct SearchResult {
    /// Indices into the sorted amounts.
    solutions: Vec<Vec<usize>>,
    nodes_visited: u64,
    nodes_pruned: u64,
    cap_hit: bool,
}

fn subset_sum_search(amounts: &[i64], target: i64, max_nodes: usize) -> SearchResult {
    let mut solutions: Vec<Vec<usize>> = Vec::new();
    let mut nodes_visited: u64 = 0;
    let mut nodes_pruned: u64 = 0;
    let mut cap_hit = false;
    let mut stack: Vec<usize> = Vec::new();

    #[allow(clippy::too_many_arguments)]
    fn dfs(
        amounts: &[i64],
        target: i64,
        max_nodes: usize,
        start: usize,
        current_sum: i64,
        stack: &mut Vec<usize>,
        solutions: &mut Vec<Vec<usize>>,
        nodes_visited: &mut u64,
        nodes_pruned: &mut u64,
        cap_hit: &mut bool,
    ) {
        for i in start..amounts.len() {
            if *cap_hit || solutions.len() >= MAX_SOLUTIONS {
                return;
            }
            *nodes_visited += 1;
            if *nodes_visited >= max_nodes as u64 {
                *cap_hit = true;
                return;
            }

            let sum = current_sum + amounts[i];
            if sum > target {
                // Amounts ascend: every later sibling overshoots too.
                *nodes_pruned += 1;
                return;
            }
            if sum == target {
                // Deeper nodes only add positive amounts; an equal-priced
                // sibling may still land here.
                stack.push(i);
                solutions.push(stack.clone());
                stack.pop();
                *nodes_pruned += 1;
                continue;
            }

            stack.push(i);
            dfs(
                amounts,
                target,
                max_nodes,
                i + 1,
                sum,
                stack,
                solutions,
                nodes_visited,
                nodes_pruned,
                cap_hit,
            );
            stack.pop();
        }
    }

    dfs(
        amounts,
        target,
        max_nodes,
        0,
        0,
        &mut stack,
        &mut solutions,
        &mut nodes_visited,
        &mut nodes_pruned,
        &mut cap_hit,
    );

    SearchResult {
        solutions,
        nodes_visited,
        nodes_pruned,
        cap_hit,
    }
}
