// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Access control lists.
//!
//! Policy file format, one rule per line:
//! ```text
//! # subject, object, action
//! p, root-client, *, produce
//! p, root-client, *, consume
//! p, nobody-client, *, consume
//! ```
//! `*` in a rule matches any value.

use std::path::Path;
use thiserror::Error;

use crate::errors::NodeError;
use crate::service::Authorizer;

const WILDCARD: &str = "*";

#[derive(Debug, Error)]
pub enum AclError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("policy line {line}: {reason}")]
    Parse { line: usize, reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Rule {
    subject: String,
    object: String,
    action: String,
}

impl Rule {
    fn matches(&self, subject: &str, object: &str, action: &str) -> bool {
        field_matches(&self.subject, subject)
            && field_matches(&self.object, object)
            && field_matches(&self.action, action)
    }
}

fn field_matches(rule: &str, value: &str) -> bool {
    rule == WILDCARD || rule == value
}

#[derive(Debug, Clone, Default)]
pub struct AclAuthorizer {
    rules: Vec<Rule>,
}

impl AclAuthorizer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, AclError> {
        let text = std::fs::read_to_string(path)?;
        Self::parse(&text)
    }

    pub fn parse(text: &str) -> Result<Self, AclError> {
        let mut acl = Self::new();
        for (idx, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }

            let fields: Vec<&str> = line.split(',').map(str::trim).collect();
            match fields.as_slice() {
                ["p", subject, object, action] => {
                    acl = acl.allow(*subject, *object, *action);
                }
                _ => {
                    return Err(AclError::Parse {
                        line: idx + 1,
                        reason: format!("expected `p, subject, object, action`, got `{}`", line),
                    })
                }
            }
        }
        Ok(acl)
    }

    pub fn allow(
        mut self,
        subject: impl Into<String>,
        object: impl Into<String>,
        action: impl Into<String>,
    ) -> Self {
        self.rules.push(Rule {
            subject: subject.into(),
            object: object.into(),
            action: action.into(),
        });
        self
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

impl Authorizer for AclAuthorizer {
    fn authorize(&self, subject: &str, object: &str, action: &str) -> Result<(), NodeError> {
        if self.rules.iter().any(|r| r.matches(subject, object, action)) {
            Ok(())
        } else {
            Err(NodeError::PermissionDenied(format!(
                "{} not permitted to {} to {}",
                subject, action, object
            )))
        }
    }
}

/// Permits everything. For plaintext development nodes.
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl Authorizer for AllowAll {
    fn authorize(&self, _subject: &str, _object: &str, _action: &str) -> Result<(), NodeError> {
        Ok(())
    }
}
