#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// Any identity-service failure: invalid credentials, missing required
    /// fields, duplicate account. Callers show one alert for all of them;
    /// the structured cause only goes to the log.
    AuthRejected,
}

impl std::fmt::Display for ClientError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClientError::AuthRejected => {
                write!(f, "Invalid credentials or missing required fields")
            }
        }
    }
}

impl std::error::Error for ClientError {}
