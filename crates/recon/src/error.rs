use std::fmt;

#[derive(Debug)]
pub enum ReconError {
    /// TOML parse / deserialization error.
    ConfigParse(String),
    /// Config validation error (bad pattern, empty rule, etc.).
    ConfigValidation(String),
    /// A money field could not be read as cents.
    AmountParse { source: String, record_id: String, value: String },
    /// A date field could not be parsed.
    DateParse { source: String, record_id: String, value: String },
    /// A direct reference names an order with no charge lines.
    UnknownOrder { reference: String, order_id: String },
    /// JSON input could not be deserialized.
    InputParse(String),
}

impl fmt::Display for ReconError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ConfigParse(msg) => write!(f, "config parse error: {msg}"),
            Self::ConfigValidation(msg) => write!(f, "config validation error: {msg}"),
            Self::AmountParse { source, record_id, value } => {
                write!(f, "{source} '{record_id}': cannot parse amount '{value}'")
            }
            Self::DateParse { source, record_id, value } => {
                write!(f, "{source} '{record_id}': cannot parse date '{value}'")
            }
            Self::UnknownOrder { reference, order_id } => {
                write!(f, "reference '{reference}': unknown order '{order_id}'")
            }
            Self::InputParse(msg) => write!(f, "input parse error: {msg}"),
        }
    }
}

impl std::error::Error for ReconError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_record_and_value() {
        let err = ReconError::AmountParse {
            source: "item".into(),
            record_id: "111-222".into(),
            value: "$abc".into(),
        };
        assert_eq!(err.to_string(), "item '111-222': cannot parse amount '$abc'");
    }
}
