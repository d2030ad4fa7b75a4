//! Request canonicalization and build identity hashing
//!
//! Turns raw request parameters into canonical build parameters. Features are
//! reordered into registry order and an irrelevant sub-variant is dropped, so
//! equivalent requests always hash to the same identity.

use crate::config::schema::FeaturesConfig;
use crate::error::{KilnError, KilnResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use tracing::debug;

/// Raw build request as received from the outer layer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRequest {
    /// Target operating system
    pub os: String,
    /// Target architecture
    pub arch: String,
    /// Architecture sub-variant (only meaningful for the variant architecture)
    #[serde(default)]
    pub arm: String,
    /// Comma-separated feature list
    #[serde(default)]
    pub features: String,
}

impl BuildRequest {
    /// Create a request from its raw parts
    pub fn new(
        os: impl Into<String>,
        arch: impl Into<String>,
        arm: impl Into<String>,
        features: impl Into<String>,
    ) -> Self {
        Self {
            os: os.into(),
            arch: arch.into(),
            arm: arm.into(),
            features: features.into(),
        }
    }

    /// Non-empty feature tokens, in request order
    pub fn feature_tokens(&self) -> impl Iterator<Item = &str> {
        self.features
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
    }
}

/// Ordered catalog of known feature directives
///
/// Registry order is the canonical feature order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureRegistry {
    directives: Vec<String>,
}

impl FeatureRegistry {
    /// Create a registry from directives in canonical order
    pub fn new<I, S>(directives: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut seen = Vec::new();
        for directive in directives {
            let directive = directive.into();
            if !seen.contains(&directive) {
                seen.push(directive);
            }
        }
        Self { directives: seen }
    }

    /// Whether a directive is known
    pub fn contains(&self, directive: &str) -> bool {
        self.position(directive).is_some()
    }

    /// Canonical position of a directive
    pub fn position(&self, directive: &str) -> Option<usize> {
        self.directives.iter().position(|d| d == directive)
    }

    /// Iterate directives in canonical order
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.directives.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.directives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.directives.is_empty()
    }

    /// Reorder tokens into registry order, dropping unknown and duplicate ones
    pub fn canonicalize<'a>(&self, tokens: impl IntoIterator<Item = &'a str>) -> Vec<String> {
        let requested: Vec<&str> = tokens.into_iter().collect();
        self.directives
            .iter()
            .filter(|d| requested.contains(&d.as_str()))
            .cloned()
            .collect()
    }
}

/// Deterministic identity of a canonical parameter set
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BuildIdentity(String);

impl BuildIdentity {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BuildIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Canonical build parameters
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BuildParameters {
    /// Target operating system
    pub os: String,
    /// Target architecture
    pub arch: String,
    /// Sub-variant; `None` unless the architecture makes it meaningful
    pub variant: Option<String>,
    /// Features in registry order
    pub features: Vec<String>,
}

impl BuildParameters {
    /// Serialized key the identity is hashed from
    pub fn canonical_key(&self) -> String {
        format!(
            "os={}\narch={}\nvariant={}\nfeatures={}\n",
            self.os,
            self.arch,
            self.variant.as_deref().unwrap_or(""),
            self.features.join(",")
        )
    }

    /// SHA256 of the canonical key, first 32 hex chars
    pub fn identity(&self) -> BuildIdentity {
        let mut hasher = Sha256::new();
        hasher.update(self.canonical_key().as_bytes());
        let result = hasher.finalize();

        BuildIdentity(hex::encode(&result[..16]))
    }

    /// Feature list as a comma-separated string
    pub fn features_csv(&self) -> String {
        self.features.join(",")
    }

    /// Whether the target OS is in the Windows family
    pub fn is_windows(&self) -> bool {
        self.os.eq_ignore_ascii_case("windows")
    }
}

/// Validates raw requests and canonicalizes them
#[derive(Debug, Clone)]
pub struct RequestNormalizer {
    registry: FeatureRegistry,
    variant_arch: String,
}

impl RequestNormalizer {
    pub fn new(registry: FeatureRegistry, variant_arch: impl Into<String>) -> Self {
        Self {
            registry,
            variant_arch: variant_arch.into(),
        }
    }

    /// Build a normalizer from the `[features]` config section
    pub fn from_config(config: &FeaturesConfig) -> Self {
        Self::new(
            FeatureRegistry::new(config.registry.iter().cloned()),
            config.variant_arch.clone(),
        )
    }

    pub fn registry(&self) -> &FeatureRegistry {
        &self.registry
    }

    /// Reject malformed parameters before anything touches the build table
    pub fn validate(&self, request: &BuildRequest) -> KilnResult<()> {
        check_token("os", &request.os)?;
        check_token("arch", &request.arch)?;

        if request.arch == self.variant_arch
            && !request.arm.is_empty()
            && !request.arm.chars().all(|c| c.is_ascii_digit())
        {
            return Err(KilnError::invalid(
                "arm",
                format!("expected a numeric variant, got {:?}", request.arm),
            ));
        }

        if let Some(unknown) = request
            .feature_tokens()
            .find(|t| !self.registry.contains(t))
        {
            return Err(KilnError::invalid(
                "features",
                format!("unknown feature: {}", unknown),
            ));
        }

        Ok(())
    }

    /// Canonicalize a request. Pure: never fails, never touches state.
    pub fn normalize(&self, request: &BuildRequest) -> BuildParameters {
        let variant = if request.arch == self.variant_arch && !request.arm.is_empty() {
            Some(request.arm.clone())
        } else {
            None
        };

        let features = self.registry.canonicalize(request.feature_tokens());
        let dropped = request.feature_tokens().count() - features.len();
        if dropped > 0 {
            debug!("Dropped {} unknown or duplicate feature token(s)", dropped);
        }

        BuildParameters {
            os: request.os.clone(),
            arch: request.arch.clone(),
            variant,
            features,
        }
    }
}

fn check_token(name: &'static str, value: &str) -> KilnResult<()> {
    if value.is_empty() {
        return Err(KilnError::invalid(name, "must not be empty"));
    }
    if !value
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
    {
        return Err(KilnError::invalid(
            name,
            format!("{:?} contains characters outside [a-z0-9_]", value),
        ));
    }
    Ok(())
}
