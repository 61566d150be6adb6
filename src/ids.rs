//! Composite external identifiers
//!
//! Sub-elements of a policy have no server-side identity of their own, so the
//! provider addresses them with a colon-delimited string combining the parent
//! policy ID with the child key (and, for principals, the principal type):
//!
//! ```text
//! policy-id:child-id
//! policy-id:child-id:DISCRIMINATOR
//! ```
//!
//! These strings are user-facing (import IDs) and are never sent to the backend.

use crate::model::PrincipalType;

/// Separator between ID parts
pub const SEPARATOR: char = ':';

/// Error from decoding a composite external ID
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    #[error("invalid id {input:?}: expected 2 or 3 parts separated by ':', found {found}")]
    PartCount { input: Box<str>, found: usize },
    #[error("invalid id {input:?}: part {index} is empty")]
    EmptyPart { input: Box<str>, index: usize },
    #[error("invalid id {input:?}: discriminator {value:?} is not one of {allowed:?}")]
    InvalidDiscriminator {
        input: Box<str>,
        value: Box<str>,
        allowed: &'static [&'static str],
    },
    #[error("invalid id {input:?}: expected format {expected}")]
    UnexpectedShape { input: Box<str>, expected: &'static str },
    #[error("invalid id {input:?}: instance id {value:?} is not an unsigned integer")]
    InvalidInstanceId { input: Box<str>, value: Box<str> },
}

/// A decoded composite ID
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ExternalId {
    pub parent: Box<str>,
    pub child: Box<str>,
    pub discriminator: Option<Box<str>>,
}

impl ExternalId {
    /// Render back to the external string form
    pub fn encode(&self) -> String {
        match &self.discriminator {
            Some(d) => encode_with(&self.parent, &self.child, d),
            None => encode(&self.parent, &self.child),
        }
    }
}

impl std::fmt::Display for ExternalId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.encode())
    }
}

/// `parent:child`
pub fn encode(parent: &str, child: &str) -> String {
    format!("{parent}{SEPARATOR}{child}")
}

/// `parent:child:discriminator`
pub fn encode_with(parent: &str, child: &str, discriminator: &str) -> String {
    format!("{parent}{SEPARATOR}{child}{SEPARATOR}{discriminator}")
}

/// Split and validate a composite ID.
///
/// `allowed` lists the discriminator values accepted in a third part; an empty
/// list means the element kind has no discriminator and 3-part IDs are rejected.
pub fn decode(input: &str, allowed: &'static [&'static str]) -> Result<ExternalId, IdError> {
    let parts: Vec<&str> = input.split(SEPARATOR).collect();
    if !(2..=3).contains(&parts.len()) {
        return Err(IdError::PartCount {
            input: input.into(),
            found: parts.len(),
        });
    }
    if let Some(index) = parts.iter().position(|p| p.is_empty()) {
        return Err(IdError::EmptyPart {
            input: input.into(),
            index,
        });
    }

    let discriminator = match parts.get(2) {
        Some(value) if allowed.contains(value) => Some((*value).into()),
        Some(value) => {
            return Err(IdError::InvalidDiscriminator {
                input: input.into(),
                value: (*value).into(),
                allowed,
            })
        }
        None => None,
    };

    Ok(ExternalId {
        parent: parts[0].into(),
        child: parts[1].into(),
        discriminator,
    })
}

/// Address of one principal inside a policy: `policy:principal:TYPE`
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PrincipalRef {
    pub policy_id: Box<str>,
    pub principal_id: Box<str>,
    pub principal_type: PrincipalType,
}

impl PrincipalRef {
    const SHAPE: &'static str = "policy-id:principal-id:USER|GROUP|ROLE";

    pub fn new(
        policy_id: impl Into<Box<str>>,
        principal_id: impl Into<Box<str>>,
        principal_type: PrincipalType,
    ) -> Self {
        Self {
            policy_id: policy_id.into(),
            principal_id: principal_id.into(),
            principal_type,
        }
    }

    pub fn parse(input: &str) -> Result<Self, IdError> {
        let id = decode(input, PrincipalType::DISCRIMINATORS)?;
        let Some(disc) = id.discriminator else {
            return Err(IdError::UnexpectedShape {
                input: input.into(),
                expected: Self::SHAPE,
            });
        };
        // decode() already restricted the value to DISCRIMINATORS
        let principal_type =
            PrincipalType::from_discriminator(&disc).ok_or(IdError::InvalidDiscriminator {
                input: input.into(),
                value: disc.clone(),
                allowed: PrincipalType::DISCRIMINATORS,
            })?;
        Ok(Self {
            policy_id: id.parent,
            principal_id: id.child,
            principal_type,
        })
    }

    pub fn encode(&self) -> String {
        encode_with(
            &self.policy_id,
            &self.principal_id,
            self.principal_type.as_str(),
        )
    }
}

impl std::fmt::Display for PrincipalRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.encode())
    }
}

/// Address of one database target instance inside a policy: `policy:instance`
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DatabaseRef {
    pub policy_id: Box<str>,
    pub instance_id: u64,
}

impl DatabaseRef {
    pub fn new(policy_id: impl Into<Box<str>>, instance_id: u64) -> Self {
        Self {
            policy_id: policy_id.into(),
            instance_id,
        }
    }

    /// The instance part must be the canonical decimal form, so `+42` and
    /// `042` are rejected rather than aliased onto instance 42
    pub fn parse(input: &str) -> Result<Self, IdError> {
        let id = decode(input, &[])?;
        let invalid = || IdError::InvalidInstanceId {
            input: input.into(),
            value: id.child.clone(),
        };
        let digits = &*id.child;
        let canonical = digits.bytes().all(|b| b.is_ascii_digit())
            && !(digits.len() > 1 && digits.starts_with('0'));
        if !canonical {
            return Err(invalid());
        }
        let instance_id = digits.parse::<u64>().map_err(|_| invalid())?;
        Ok(Self {
            policy_id: id.parent,
            instance_id,
        })
    }

    pub fn encode(&self) -> String {
        encode(&self.policy_id, &self.instance_id.to_string())
    }
}

impl std::fmt::Display for DatabaseRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.encode())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const KINDS: &[&str] = &["USER", "GROUP", "ROLE"];

    #[test]
    fn test_encode_forms() {
        assert_eq!(encode("pol-1", "alice"), "pol-1:alice");
        assert_eq!(encode_with("pol-1", "alice", "USER"), "pol-1:alice:USER");
    }

    #[test]
    fn test_rejects_too_many_parts() {
        let err = decode("a:b:c:d", KINDS).unwrap_err();
        assert!(matches!(err, IdError::PartCount { found: 4, .. }));
    }

    #[test]
    fn test_rejects_single_part() {
        let err = decode("lonely", KINDS).unwrap_err();
        assert!(matches!(err, IdError::PartCount { found: 1, .. }));
    }

    #[test]
    fn test_rejects_empty_part() {
        let err = decode("a::c", KINDS).unwrap_err();
        assert!(matches!(err, IdError::EmptyPart { index: 1, .. }));
        assert!(matches!(
            decode(":b", KINDS).unwrap_err(),
            IdError::EmptyPart { index: 0, .. }
        ));
    }

    #[test]
    fn test_rejects_invalid_discriminator() {
        let err = decode("a:b:INVALID", KINDS).unwrap_err();
        assert!(matches!(err, IdError::InvalidDiscriminator { .. }));
        // discriminators are case-sensitive
        assert!(decode("a:b:user", KINDS).is_err());
    }

    #[test]
    fn test_principal_ref_requires_type() {
        let parsed = PrincipalRef::parse("pol-1:alice:GROUP").unwrap();
        assert_eq!(parsed.principal_type, PrincipalType::Group);
        assert_eq!(parsed.encode(), "pol-1:alice:GROUP");

        assert!(matches!(
            PrincipalRef::parse("pol-1:alice").unwrap_err(),
            IdError::UnexpectedShape { .. }
        ));
    }

    #[test]
    fn test_database_ref() {
        let parsed = DatabaseRef::parse("pol-1:42").unwrap();
        assert_eq!(parsed, DatabaseRef::new("pol-1", 42));
        assert_eq!(parsed.to_string(), "pol-1:42");

        for bad in ["pol-1:abc", "pol-1:+42", "pol-1:042", "pol-1:00", "pol-1:18446744073709551616"] {
            assert!(
                matches!(DatabaseRef::parse(bad).unwrap_err(), IdError::InvalidInstanceId { .. }),
                "{bad}"
            );
        }
        assert_eq!(DatabaseRef::parse("pol-1:0").unwrap().instance_id, 0);
        assert_eq!(
            DatabaseRef::parse("pol-1:18446744073709551615").unwrap().instance_id,
            u64::MAX
        );
        assert!(matches!(
            DatabaseRef::parse("pol-1:42:USER").unwrap_err(),
            IdError::InvalidDiscriminator { .. }
        ));
    }

    proptest! {
        #[test]
        fn prop_two_part_round_trip(p in "[A-Za-z0-9_.-]{1,24}", c in "[A-Za-z0-9_.@-]{1,24}") {
            let id = decode(&encode(&p, &c), KINDS).unwrap();
            prop_assert_eq!(&*id.parent, p.as_str());
            prop_assert_eq!(&*id.child, c.as_str());
            prop_assert!(id.discriminator.is_none());
        }

        #[test]
        fn prop_three_part_round_trip(
            p in "[A-Za-z0-9_.-]{1,24}",
            c in "[A-Za-z0-9_.@-]{1,24}",
            d in proptest::sample::select(KINDS),
        ) {
            let id = decode(&encode_with(&p, &c, d), KINDS).unwrap();
            prop_assert_eq!(&*id.parent, p.as_str());
            prop_assert_eq!(&*id.child, c.as_str());
            prop_assert_eq!(id.discriminator.as_deref(), Some(d));
        }
    }
}
