/*!
# Member Signatures

Canonical identity of a callable member. The catalogue is keyed by
[`MemberSignature`] and the rewriter derives one from every call operand, so
both sides agree through a single type rather than through hand-written text.

Canonical text: `Ret Owner::Name(P1,P2&)`, e.g.
`System.Boolean System.nint::TryParse(System.String,System.nint&)`.
*/

use std::fmt;
use std::str::FromStr;

use crate::module::{MemberRef, MethodDef, TypeDef, TypeSig};

/// One parameter slot of a signature
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SignatureParam {
    pub type_name: String,
    pub by_ref: bool,
}

impl SignatureParam {
    fn from_sig(ty: &TypeSig) -> Self {
        match ty {
            TypeSig::ByRef(inner) => Self {
                type_name: inner.full_name(),
                by_ref: true,
            },
            other => Self {
                type_name: other.full_name(),
                by_ref: false,
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MemberSignature {
    pub owner: String,
    pub name: String,
    pub return_type: String,
    pub parameters: Vec<SignatureParam>,
}

impl MemberSignature {
    /// Signature of a referenced member
    pub fn of(member: &MemberRef) -> Self {
        Self {
            owner: member.declaring_type.full_name(),
            name: member.name.clone(),
            return_type: member.return_type.ty.full_name(),
            parameters: member
                .parameters
                .iter()
                .map(|p| SignatureParam::from_sig(&p.ty))
                .collect(),
        }
    }

    /// Signature of a method defined in a module
    pub fn of_method(owner: &TypeDef, method: &MethodDef) -> Self {
        Self {
            owner: owner.full_name(),
            name: method.name.clone(),
            return_type: method.return_type.full_name(),
            parameters: method.parameters.iter().map(SignatureParam::from_sig).collect(),
        }
    }

    /// Canonical text form
    pub fn canonical(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for MemberSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}::{}(", self.return_type, self.owner, self.name)?;
        for (i, param) in self.parameters.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            f.write_str(&param.type_name)?;
            if param.by_ref {
                f.write_str("&")?;
            }
        }
        f.write_str(")")
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("malformed member signature `{text}`: {reason}")]
pub struct SignatureParseError {
    pub text: String,
    pub reason: &'static str,
}

impl FromStr for MemberSignature {
    type Err = SignatureParseError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let fail = |reason| SignatureParseError {
            text: text.to_string(),
            reason,
        };

        let trimmed = text.trim();
        let (return_type, rest) = trimmed
            .split_once(char::is_whitespace)
            .ok_or_else(|| fail("missing return type"))?;
        let (owner, rest) = rest.trim().split_once("::").ok_or_else(|| fail("missing `::`"))?;
        let open = rest.find('(').ok_or_else(|| fail("missing `(`"))?;
        if !rest.ends_with(')') {
            return Err(fail("missing closing `)`"));
        }

        let name = rest[..open].trim();
        let owner = owner.trim();
        if name.is_empty() || owner.is_empty() {
            return Err(fail("empty owner or member name"));
        }

        let list = rest[open + 1..rest.len() - 1].trim();
        let parameters = if list.is_empty() {
            Vec::new()
        } else {
            list.split(',')
                .map(|raw| {
                    let raw = raw.trim();
                    if raw.is_empty() {
                        return Err(fail("empty parameter type"));
                    }
                    Ok(match raw.strip_suffix('&') {
                        Some(inner) => SignatureParam {
                            type_name: inner.trim_end().to_string(),
                            by_ref: true,
                        },
                        None => SignatureParam {
                            type_name: raw.to_string(),
                            by_ref: false,
                        },
                    })
                })
                .collect::<Result<Vec<_>, _>>()?
        };

        Ok(Self {
            owner: owner.to_string(),
            name: name.to_string(),
            return_type: return_type.to_string(),
            parameters,
        })
    }
}
