use super::error::BrokerError;

/// Number of characters in a time-based MFA code
pub const MFA_CODE_LENGTH: usize = 6;

/// A validated MFA token code
#[derive(Clone, PartialEq, Eq)]
pub struct MfaCode(String);

impl MfaCode {
    /// Parse a submitted code: at least six bytes, truncated to six, digits only
    pub fn parse(input: &[u8]) -> Result<Self, BrokerError> {
        if input.len() < MFA_CODE_LENGTH {
            return Err(BrokerError::InvalidMfaCode);
        }

        let code = &input[..MFA_CODE_LENGTH];
        if !code.iter().all(u8::is_ascii_digit) {
            return Err(BrokerError::InvalidMfaCode);
        }

        // ASCII digits are always valid UTF-8
        Ok(Self(String::from_utf8_lossy(code).into_owned()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for MfaCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MfaCode(******)")
    }
}
