use lazy_static::lazy_static;
use regex::Regex;
use thiserror::Error;

const MAX_EMAIL_LEN: usize = 254;
const MAX_LOCAL_LEN: usize = 64;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum InvalidEmail {
    #[error("The email address is empty.")]
    Empty,
    #[error("The email address must have exactly one @-sign.")]
    AtSign,
    #[error("The email address is too long.")]
    TooLong,
    #[error("The part before the @-sign is not valid.")]
    LocalPart,
    #[error("The domain name is not valid.")]
    Domain,
}

lazy_static! {
    // dot-atom local part (RFC 5322 section 3.2.3), no quoted strings
    static ref LOCAL_RE: Regex =
        Regex::new(r"^[a-z0-9!#$%&'*+/=?^_`{|}~-]+(\.[a-z0-9!#$%&'*+/=?^_`{|}~-]+)*$").unwrap();
    // hostname labels plus an alphabetic top-level domain
    static ref DOMAIN_RE: Regex =
        Regex::new(r"^([a-z0-9]([a-z0-9-]{0,61}[a-z0-9])?\.)+[a-z]{2,63}$").unwrap();
}

/// Validates an address and returns its canonical (trimmed, lowercase) form.
pub fn normalize_email(raw: &str) -> Result<String, InvalidEmail> {
    let email = raw.trim().to_lowercase();
    if email.is_empty() {
        return Err(InvalidEmail::Empty);
    }
    if email.len() > MAX_EMAIL_LEN {
        return Err(InvalidEmail::TooLong);
    }

    let mut parts = email.split('@');
    let (Some(local), Some(domain), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(InvalidEmail::AtSign);
    };
    if local.len() > MAX_LOCAL_LEN {
        return Err(InvalidEmail::TooLong);
    }
    if !LOCAL_RE.is_match(local) {
        return Err(InvalidEmail::LocalPart);
    }
    if !DOMAIN_RE.is_match(domain) {
        return Err(InvalidEmail::Domain);
    }
    Ok(email)
}
