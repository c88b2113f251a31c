use thiserror::Error;

#[derive(Error, Debug)]
pub enum AuthError {
    #[error("Authentication is not configured: {0}")]
    Configuration(String),

    #[error("Identity provider call failed: {0}")]
    Provider(String),

    #[error("State token could not be decoded: {0}")]
    MalformedState(String),

    #[error("No session after {attempts} session checks")]
    RetryExhausted { attempts: u32 },
}

pub type Result<T> = std::result::Result<T, AuthError>;
