//! Type-safe cache key builders

use std::fmt;

pub const VERSION: &str = "v1";

pub mod payment {
    use super::*;

    pub const NAMESPACE: &str = "payment";

    /// Order created from a payment session, keyed by the session's ledger key
    #[derive(Debug, Clone)]
    pub struct OrderLinkKey {
        pub ledger_key: String,
    }

    impl OrderLinkKey {
        pub fn new(ledger_key: impl Into<String>) -> Self {
            Self {
                ledger_key: ledger_key.into(),
            }
        }
    }

    impl fmt::Display for OrderLinkKey {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "{}:{}:order_link:{}", VERSION, NAMESPACE, self.ledger_key)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_order_link_key_format() {
        let key = payment::OrderLinkKey::new("PAY-123");
        assert_eq!(key.to_string(), "v1:payment:order_link:PAY-123");

        let key = payment::OrderLinkKey::new("tid:998877");
        assert_eq!(key.to_string(), "v1:payment:order_link:tid:998877");
    }
}
