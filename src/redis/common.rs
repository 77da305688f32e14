use std::{ops::Deref, sync::Arc};

use crate::TollbucketError;

/// Validated limiter name, used as the Redis key namespace.
///
/// Constraints:
/// - Must not be empty
/// - Must not be longer than 255 bytes
/// - Must not contain colons
///
/// Bucket records live under `<name>:<request key>`. Because the name has no colon,
/// request keys may contain colons (IPv6 addresses, composite ids) without two
/// limiters ever sharing a record.
#[derive(Debug, Clone, PartialEq, PartialOrd, Hash, Eq)]
pub struct LimiterName(Arc<str>);

impl LimiterName {
    /// The name used when none is configured.
    pub fn default_name() -> Self {
        Self(Arc::from("tollbucket"))
    }
}

impl Deref for LimiterName {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl TryFrom<String> for LimiterName {
    type Error = TollbucketError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value.is_empty() {
            Err(TollbucketError::InvalidConfiguration(
                "Limiter name must not be empty".to_string(),
            ))
        } else if value.len() > 255 {
            Err(TollbucketError::InvalidConfiguration(
                "Limiter name must not be longer than 255 characters".to_string(),
            ))
        } else if value.contains(':') {
            Err(TollbucketError::InvalidConfiguration(
                "Limiter name must not contain colons".to_string(),
            ))
        } else {
            Ok(Self(Arc::from(value)))
        }
    }
}

impl TryFrom<&str> for LimiterName {
    type Error = TollbucketError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::try_from(value.to_string())
    }
}

#[derive(Clone, Debug)]
pub(crate) struct RedisKeyGenerator {
    name: LimiterName,
}

impl RedisKeyGenerator {
    pub(crate) fn new(name: LimiterName) -> Self {
        Self { name }
    }

    pub(crate) fn get_bucket_key(&self, key: &str) -> String {
        format!("{}:{}", &*self.name, key)
    }
}
