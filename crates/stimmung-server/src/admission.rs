//! Connection admission at WebSocket upgrade time.
//!
//! An [`Admission`] looks at the upgrade request before the socket is
//! accepted. It may refuse the connection (answered with `403`) or pin the
//! display name the session will join under.

use std::collections::HashMap;

use regex::Regex;
use thiserror::Error;

/// What admission gets to see of an upgrade request.
#[derive(Debug, Clone, Default)]
pub struct AdmissionRequest {
    /// Decoded query parameters.
    pub query: HashMap<String, String>,
    /// `Origin` header, if present.
    pub origin: Option<String>,
}

/// A successful admission.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Admitted {
    /// Display name the session must join under, overriding its `join`.
    pub display_name: Option<String>,
}

/// Why a connection was refused.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdmissionError {
    /// The offered display name does not match the required pattern.
    #[error("display name {0:?} does not match the required pattern")]
    InvalidName(String),
    /// Refused for another reason.
    #[error("connection refused: {0}")]
    Refused(String),
}

/// Decides whether an upgrade request may become a session.
pub trait Admission: Send + Sync {
    /// Admit or refuse a connection.
    fn admit(&self, request: &AdmissionRequest) -> Result<Admitted, AdmissionError>;
}

/// Admits every connection without pinning a name.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenAdmission;

impl Admission for OpenAdmission {
    fn admit(&self, _request: &AdmissionRequest) -> Result<Admitted, AdmissionError> {
        Ok(Admitted::default())
    }
}

/// Validates an optional `name` query parameter against a full-match pattern
/// and pins it as the session's display name.
#[derive(Debug, Clone)]
pub struct NamePatternAdmission {
    pattern: Regex,
}

impl NamePatternAdmission {
    /// Query parameter carrying the display name.
    pub const NAME_PARAM: &'static str = "name";

    /// Wrap an already anchored pattern (see [`stimmung_core::room::name_pattern`]).
    pub fn new(pattern: Regex) -> Self {
        Self { pattern }
    }
}

impl Admission for NamePatternAdmission {
    fn admit(&self, request: &AdmissionRequest) -> Result<Admitted, AdmissionError> {
        let Some(name) = request.query.get(Self::NAME_PARAM) else {
            return Ok(Admitted::default());
        };
        if !self.pattern.is_match(name) {
            return Err(AdmissionError::InvalidName(name.clone()));
        }
        Ok(Admitted {
            display_name: Some(name.clone()),
        })
    }
}
