//! Error taxonomy for the watcher.
//!
//! Collaborators report typed errors (`SourceError`, `StoreError`).
//! The collector and the gap fixer wrap them into `Error`, attaching
//! which phase failed and for which series.

use std::fmt;

use thiserror::Error;

/// Errors raised by a market data source (REST or live feed).
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("http: {0}")]
    Http(#[from] reqwest::Error),

    #[error("websocket: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("api returned {status}: {body}")]
    Api { status: u16, body: String },

    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("decode: {0}")]
    Decode(String),

    #[error("stream closed by remote")]
    Closed,
}

/// Errors raised by a series store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("redis: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("codec: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("{key} has no row for indexed open time {open_time}")]
    MissingRow { key: String, open_time: i64 },
}

/// Store operation an error happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreOp {
    Read,
    Write,
}

impl fmt::Display for StoreOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Read => f.write_str("read"),
            Self::Write => f.write_str("write"),
        }
    }
}

#[derive(Debug, Error)]
pub enum Error {
    #[error("could not parse interval {0:?}")]
    InvalidInterval(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("subscribe {series}: {source}")]
    Subscribe {
        series: String,
        #[source]
        source: SourceError,
    },

    #[error("fetch {series} [{start}, {end}]: {source}")]
    Fetch {
        series: String,
        start: i64,
        end: i64,
        #[source]
        source: SourceError,
    },

    #[error("{op} {series}: {source}")]
    Store {
        op: StoreOp,
        series: String,
        #[source]
        source: StoreError,
    },

    #[error("cancelled")]
    Cancelled,

    #[error("{0}")]
    Multiple(Errors),
}

impl Error {
    /// Joins several failure causes, keeping their order.
    ///
    /// A single cause is returned as-is; nested composites are flattened.
    pub fn join(causes: impl IntoIterator<Item = Error>) -> Error {
        let mut flat = Vec::new();
        for cause in causes {
            match cause {
                Error::Multiple(Errors(inner)) => flat.extend(inner),
                other => flat.push(other),
            }
        }

        if flat.len() == 1 {
            flat.remove(0)
        } else {
            Error::Multiple(Errors(flat))
        }
    }

    /// True if cancellation is this error or one of its causes.
    pub fn is_cancelled(&self) -> bool {
        match self {
            Error::Cancelled => true,
            Error::Multiple(errors) => errors.iter().any(Error::is_cancelled),
            _ => false,
        }
    }
}

/// Ordered list of causes; the first one triggered the failure.
#[derive(Debug)]
pub struct Errors(Vec<Error>);

impl Errors {
    pub fn iter(&self) -> std::slice::Iter<'_, Error> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_vec(self) -> Vec<Error> {
        self.0
    }
}

impl fmt::Display for Errors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, cause) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("\n")?;
            }
            write!(f, "{cause}")?;
        }
        Ok(())
    }
}
