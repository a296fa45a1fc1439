//! Route level retry policy.

use std::fmt;
use std::time::Duration;

use crate::config::loader::ConfigError;
use crate::config::schema::RetryPolicyConfig;

/// A named condition that makes an attempt eligible for retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RetryTrigger {
    /// Any 5xx response, or an upstream reset.
    ServerError,
    ConnectFailure,
    /// 409 Conflict.
    Retriable4xx,
    RefusedStream,
    GrpcCancelled,
    GrpcDeadlineExceeded,
    GrpcResourceExhausted,
}

impl RetryTrigger {
    pub const ALL: [RetryTrigger; 7] = [
        RetryTrigger::ServerError,
        RetryTrigger::ConnectFailure,
        RetryTrigger::Retriable4xx,
        RetryTrigger::RefusedStream,
        RetryTrigger::GrpcCancelled,
        RetryTrigger::GrpcDeadlineExceeded,
        RetryTrigger::GrpcResourceExhausted,
    ];

    /// Configuration token for this trigger.
    pub fn as_str(&self) -> &'static str {
        match self {
            RetryTrigger::ServerError => "5xx",
            RetryTrigger::ConnectFailure => "connect-failure",
            RetryTrigger::Retriable4xx => "retriable-4xx",
            RetryTrigger::RefusedStream => "refused-stream",
            RetryTrigger::GrpcCancelled => "cancelled",
            RetryTrigger::GrpcDeadlineExceeded => "deadline-exceeded",
            RetryTrigger::GrpcResourceExhausted => "resource-exhausted",
        }
    }

    pub fn from_token(token: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == token)
    }

    pub fn is_grpc(&self) -> bool {
        matches!(
            self,
            RetryTrigger::GrpcCancelled
                | RetryTrigger::GrpcDeadlineExceeded
                | RetryTrigger::GrpcResourceExhausted
        )
    }

    fn bit(self) -> u8 {
        1 << (self as u8)
    }
}

/// Set of retry triggers.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct RetryOn {
    bits: u8,
}

impl RetryOn {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.bits == 0
    }

    pub fn contains(&self, trigger: RetryTrigger) -> bool {
        self.bits & trigger.bit() != 0
    }

    pub fn insert(&mut self, trigger: RetryTrigger) {
        self.bits |= trigger.bit();
    }

    /// Builder-style insert.
    pub fn with(mut self, trigger: RetryTrigger) -> Self {
        self.insert(trigger);
        self
    }

    pub fn union(self, other: RetryOn) -> Self {
        Self {
            bits: self.bits | other.bits,
        }
    }

    /// True if any gRPC trigger is present.
    pub fn has_grpc(&self) -> bool {
        self.iter().any(|t| t.is_grpc())
    }

    pub fn iter(&self) -> impl Iterator<Item = RetryTrigger> + '_ {
        RetryTrigger::ALL.into_iter().filter(|t| self.contains(*t))
    }

    /// Parse a comma separated list, rejecting the first unknown token.
    pub fn parse_strict(list: &str) -> Result<Self, String> {
        let mut retry_on = Self::empty();
        for token in tokens(list) {
            match RetryTrigger::from_token(token) {
                Some(trigger) => retry_on.insert(trigger),
                None => return Err(token.to_string()),
            }
        }
        Ok(retry_on)
    }

    /// Parse a comma separated list, ignoring unknown tokens.
    ///
    /// Used for request supplied overrides, which must never fail a request.
    pub fn parse_lenient(list: &str) -> Self {
        tokens(list).filter_map(RetryTrigger::from_token).collect()
    }
}

fn tokens(list: &str) -> impl Iterator<Item = &str> {
    list.split(',').map(str::trim).filter(|t| !t.is_empty())
}

impl FromIterator<RetryTrigger> for RetryOn {
    fn from_iter<I: IntoIterator<Item = RetryTrigger>>(iter: I) -> Self {
        let mut retry_on = Self::empty();
        for trigger in iter {
            retry_on.insert(trigger);
        }
        retry_on
    }
}

impl fmt::Display for RetryOn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<_> = self.iter().map(|t| t.as_str()).collect();
        write!(f, "{}", names.join(","))
    }
}

impl fmt::Debug for RetryOn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

/// Retry policy for a route. A route without retries carries the empty policy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryPolicy {
    retry_on: RetryOn,
    num_retries: u32,
    per_try_timeout: Option<Duration>,
}

impl RetryPolicy {
    pub fn new(retry_on: RetryOn, num_retries: u32, per_try_timeout: Option<Duration>) -> Self {
        Self {
            retry_on,
            num_retries,
            per_try_timeout,
        }
    }

    pub fn from_config(config: &RetryPolicyConfig) -> Result<Self, ConfigError> {
        let retry_on = RetryOn::parse_strict(&config.retry_on)
            .map_err(ConfigError::RetryOn)?;
        let per_try_timeout = match config.per_try_timeout_ms {
            0 => None,
            ms => Some(Duration::from_millis(ms)),
        };
        Ok(Self::new(retry_on, config.num_retries, per_try_timeout))
    }

    pub fn retry_on(&self) -> RetryOn {
        self.retry_on
    }

    /// Number of retries allowed against the route.
    pub fn num_retries(&self) -> u32 {
        self.num_retries
    }

    pub fn per_try_timeout(&self) -> Option<Duration> {
        self.per_try_timeout
    }
}
