//! Short-lived signed cluster credentials for the downloads service

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{Algorithm, EncodingKey, Header};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::CategoriesCluster;

/// How long a minted credential stays valid
pub const CREDENTIAL_TTL_SECONDS: i64 = 30;

/// Token claims: every cluster field plus a whole-second expiration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterClaims {
    #[serde(flatten)]
    pub cluster: CategoriesCluster,
    pub exp: i64,
}

pub struct ClusterSigner {
    key: EncodingKey,
}

impl ClusterSigner {
    pub fn new(secret: &SecretString) -> Self {
        Self {
            key: EncodingKey::from_secret(secret.expose_secret().as_bytes()),
        }
    }

    pub fn mint(&self, cluster: &CategoriesCluster) -> Result<String> {
        self.mint_at(cluster, Utc::now())
    }

    /// Signs `cluster` with an HS256 token expiring 30 seconds after `now`.
    pub fn mint_at(&self, cluster: &CategoriesCluster, now: DateTime<Utc>) -> Result<String> {
        let claims = ClusterClaims {
            cluster: cluster.clone(),
            exp: expiration_from(now),
        };

        Ok(jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &self.key,
        )?)
    }
}

/// `now + 30s`, sub-second part dropped.
pub fn expiration_from(now: DateTime<Utc>) -> i64 {
    (now + Duration::seconds(CREDENTIAL_TTL_SECONDS)).timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use jsonwebtoken::{DecodingKey, Validation, decode};

    const SECRET: &str = "test-domain-secret";

    fn cluster() -> CategoriesCluster {
        CategoriesCluster {
            uuid: "cluster-1".to_string(),
            name: "Wallpapers".to_string(),
            fs_path: "/srv/wallpapers".to_string(),
            filter_category: "filter-1".to_string(),
            root_category: "root-1".to_string(),
        }
    }

    fn decode_claims(token: &str) -> ClusterClaims {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.required_spec_claims.clear();

        decode::<ClusterClaims>(
            token,
            &DecodingKey::from_secret(SECRET.as_bytes()),
            &validation,
        )
        .unwrap()
        .claims
    }

    #[test]
    fn expiration_is_thirty_whole_seconds_after_mint() {
        let signer = ClusterSigner::new(&SecretString::from(SECRET.to_string()));
        let now = Utc
            .timestamp_opt(1_700_000_000, 987_654_321)
            .single()
            .unwrap();

        let claims = decode_claims(&signer.mint_at(&cluster(), now).unwrap());

        assert_eq!(claims.exp, 1_700_000_030);
    }

    #[test]
    fn claims_carry_every_cluster_field() {
        let signer = ClusterSigner::new(&SecretString::from(SECRET.to_string()));

        let claims = decode_claims(&signer.mint(&cluster()).unwrap());

        assert_eq!(claims.cluster, cluster());
    }

    #[test]
    fn token_signed_with_other_secret_is_rejected() {
        let signer = ClusterSigner::new(&SecretString::from("other".to_string()));
        let token = signer.mint(&cluster()).unwrap();

        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        let result = decode::<ClusterClaims>(
            &token,
            &DecodingKey::from_secret(SECRET.as_bytes()),
            &validation,
        );

        assert!(result.is_err());
    }
}
