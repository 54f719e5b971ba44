//! Login email address.

/// Why a login email was refused before reaching the identity provider.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum EmailError {
    #[error("Please enter your email address")]
    Empty,
    #[error("Email must be at most {max} characters")]
    TooLong { max: usize },
    #[error("Please enter a valid email address")]
    Malformed,
}

/// An email address as typed on the login form, trimmed.
///
/// The check is structural: something before and after a single `@`.
/// Whether an account exists is up to the identity provider.
///
/// ```
/// use table1837_core::Email;
///
/// assert_eq!(Email::parse(" bar@table1837.com ").unwrap().as_str(), "bar@table1837.com");
/// assert!(Email::parse("bar@").is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email(String);

impl Email {
    /// RFC 5321 path limit.
    pub const MAX_LENGTH: usize = 254;

    /// # Errors
    ///
    /// Returns an error if the trimmed input is empty, too long, or not of
    /// the form `local@domain`.
    pub fn parse(input: &str) -> Result<Self, EmailError> {
        let address = input.trim();
        if address.is_empty() {
            return Err(EmailError::Empty);
        }
        if address.len() > Self::MAX_LENGTH {
            return Err(EmailError::TooLong {
                max: Self::MAX_LENGTH,
            });
        }

        match address.split_once('@') {
            Some((local, domain))
                if !local.is_empty() && !domain.is_empty() && !domain.contains('@') =>
            {
                Ok(Self(address.to_owned()))
            }
            _ => Err(EmailError::Malformed),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_login_addresses() {
        for address in ["bar@table1837.com", "first.last+tag@glenrockmill.co.uk", "a@b"] {
            assert_eq!(Email::parse(address).unwrap().as_str(), address);
        }
    }

    #[test]
    fn test_trims_autofill_whitespace() {
        let email = Email::parse("  staff@table1837.com \n").unwrap();
        assert_eq!(email.as_str(), "staff@table1837.com");
    }

    #[test]
    fn test_blank_input() {
        assert_eq!(Email::parse("   "), Err(EmailError::Empty));
    }

    #[test]
    fn test_rejects_malformed_addresses() {
        for address in ["no-at-symbol", "@table1837.com", "bar@", "a@b@c"] {
            assert_eq!(Email::parse(address), Err(EmailError::Malformed), "{address}");
        }
    }

    #[test]
    fn test_rejects_overlong_address() {
        let long = format!("{}@table1837.com", "a".repeat(250));
        assert!(matches!(Email::parse(&long), Err(EmailError::TooLong { .. })));
    }
}
