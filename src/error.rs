use std::fmt;

#[derive(Debug)]
pub enum Error {
    Config(String),
    Auth(String),
    NotAuthenticated,
    Fetch(String),
    Http(reqwest::Error),
    Io(std::io::Error),
    Yaml(serde_yaml::Error),
}

impl Error {
    /// Whether a polling driver can skip this cycle and try again on the next one.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::Fetch(_))
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Config(msg) => write!(f, "Configuration error: {}", msg),
            Error::Auth(msg) => write!(f, "Authentication error: {}", msg),
            Error::NotAuthenticated => {
                write!(f, "Not authenticated. Call login() before fetching status.")
            }
            Error::Fetch(msg) => write!(f, "Status fetch error: {}", msg),
            Error::Http(err) => write!(f, "HTTP error: {}", err),
            Error::Io(err) => write!(f, "IO error: {}", err),
            Error::Yaml(err) => write!(f, "YAML parsing error: {}", err),
        }
    }
}

impl std::error::Error for Error {}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Http(err)
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::Yaml(err)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
