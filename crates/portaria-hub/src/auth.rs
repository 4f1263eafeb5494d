//! Subscriber credential checks.
//!
//! Dashboards present an HS256 JSON Web Token in the `token` query parameter
//! of the socket URL. Under [`AuthPolicy::Permissive`] a token that fails
//! verification still connects, as the demo identity; a token that is missing
//! altogether is always refused.

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD as B64URL;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::Sha256;
use thiserror::Error;

type HmacSha256 = Hmac<Sha256>;

/// Literal token accepted as the demo identity under the permissive policy.
pub const DEMO_TOKEN: &str = "demo-token";

/// How to treat tokens that fail verification.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthPolicy {
  /// Fall back to the demo identity.
  #[default]
  Permissive,
  /// Refuse the connection.
  Strict,
}

/// Who a subscriber is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
  pub user_id:    String,
  pub role:       String,
  pub identifier: Option<String>,
}

impl Identity {
  pub fn demo() -> Self {
    Self {
      user_id:    "demo-user".to_owned(),
      role:       "demo".to_owned(),
      identifier: Some("demo-identificador".to_owned()),
    }
  }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthFailure {
  #[error("token is required")]
  TokenRequired,
  #[error("invalid token: {0}")]
  InvalidToken(String),
}

impl AuthFailure {
  /// The code carried by the ERROR frame sent before closing.
  pub fn code(&self) -> &'static str {
    match self {
      Self::TokenRequired => "TOKEN_REQUIRED",
      Self::InvalidToken(_) => "INVALID_TOKEN",
    }
  }
}

/// Token claims. `userId` may be a JSON string or number.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Claims {
  pub user_id:    Value,
  pub role:       String,
  #[serde(default, rename = "identificador", skip_serializing_if = "Option::is_none")]
  pub identifier: Option<String>,
  /// Expiry, seconds since the Unix epoch.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub exp:        Option<i64>,
}

impl Claims {
  fn into_identity(self) -> Identity {
    let user_id = match self.user_id {
      Value::String(s) => s,
      other => other.to_string(),
    };
    Identity { user_id, role: self.role, identifier: self.identifier }
  }
}

#[derive(Deserialize)]
struct Header {
  alg: String,
}

// ─── Authenticator ────────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct Authenticator {
  secret: Vec<u8>,
  policy: AuthPolicy,
}

impl Authenticator {
  pub fn new(secret: impl Into<Vec<u8>>, policy: AuthPolicy) -> Self {
    Self { secret: secret.into(), policy }
  }

  /// Resolve a credential to an identity according to the policy.
  pub fn authenticate(&self, credential: Option<&str>) -> Result<Identity, AuthFailure> {
    let token = match credential.map(str::trim) {
      Some(token) if !token.is_empty() => token,
      _ => return Err(AuthFailure::TokenRequired),
    };

    let verified = if token == DEMO_TOKEN {
      Err("demo token".to_owned())
    } else {
      self.verify(token).map(Claims::into_identity)
    };

    match (verified, self.policy) {
      (Ok(identity), _) => Ok(identity),
      (Err(reason), AuthPolicy::Permissive) => {
        if token != DEMO_TOKEN {
          tracing::warn!(reason, "token rejected, connecting as demo identity");
        }
        Ok(Identity::demo())
      }
      (Err(reason), AuthPolicy::Strict) => Err(AuthFailure::InvalidToken(reason)),
    }
  }

  /// Verify signature, algorithm, and expiry of an HS256 token.
  pub fn verify(&self, token: &str) -> Result<Claims, String> {
    let mut parts = token.split('.');
    let (Some(header), Some(payload), Some(signature), None) =
      (parts.next(), parts.next(), parts.next(), parts.next())
    else {
      return Err("not a three-part token".to_owned());
    };

    let header: Header = decode_segment(header)?;
    if header.alg != "HS256" {
      return Err(format!("unsupported algorithm {}", header.alg));
    }

    let signature = B64URL
      .decode(signature)
      .map_err(|e| format!("bad signature encoding: {e}"))?;
    let signed_len = token.len() - signature_len(token);
    self
      .mac(&token.as_bytes()[..signed_len])?
      .verify_slice(&signature)
      .map_err(|_| "signature mismatch".to_owned())?;

    let claims: Claims = decode_segment(payload)?;
    if let Some(exp) = claims.exp
      && exp <= Utc::now().timestamp()
    {
      return Err("token expired".to_owned());
    }
    Ok(claims)
  }

  /// Sign `claims` with this authenticator's secret.
  pub fn issue(&self, claims: &Claims) -> Result<String, String> {
    let header = B64URL.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = serde_json::to_vec(claims).map_err(|e| e.to_string())?;
    let signing_input = format!("{header}.{}", B64URL.encode(payload));
    let tag = self.mac(signing_input.as_bytes())?.finalize().into_bytes();
    Ok(format!("{signing_input}.{}", B64URL.encode(tag)))
  }

  fn mac(&self, input: &[u8]) -> Result<HmacSha256, String> {
    let mut mac = HmacSha256::new_from_slice(&self.secret).map_err(|e| e.to_string())?;
    mac.update(input);
    Ok(mac)
  }
}

/// Length of the `.signature` suffix, separator included.
fn signature_len(token: &str) -> usize {
  token.rfind('.').map_or(0, |dot| token.len() - dot)
}

fn decode_segment<T: serde::de::DeserializeOwned>(segment: &str) -> Result<T, String> {
  let bytes = B64URL
    .decode(segment)
    .map_err(|e| format!("bad segment encoding: {e}"))?;
  serde_json::from_slice(&bytes).map_err(|e| format!("bad segment json: {e}"))
}
