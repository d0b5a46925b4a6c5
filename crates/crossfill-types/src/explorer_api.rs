use serde::{Deserialize, Serialize};

/// An explorer (etherscan-compatible) API key, readable from the env.
#[derive(Clone, Serialize)]
pub struct ExplorerApiKey(String);

impl std::fmt::Debug for ExplorerApiKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("ExplorerApiKey").finish()
    }
}

impl From<String> for ExplorerApiKey {
    fn from(api_key: String) -> Self {
        ExplorerApiKey(api_key)
    }
}

impl std::ops::Deref for ExplorerApiKey {
    type Target = String;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<'de> Deserialize<'de> for ExplorerApiKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct ExplorerApiKeyVisitor;
        impl<'de> serde::de::Visitor<'de> for ExplorerApiKeyVisitor {
            type Value = String;

            fn expecting(
                &self,
                formatter: &mut std::fmt::Formatter,
            ) -> std::fmt::Result {
                formatter.write_str(
                    "explorer api key or an env var containing an explorer api key in it",
                )
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                if value.starts_with('$') {
                    // env
                    let var = value.strip_prefix('$').unwrap_or(value);
                    tracing::trace!("Reading {} from env", var);
                    let val = std::env::var(var).map_err(|e| {
                        serde::de::Error::custom(format!(
                            "error while loading this env {var}: {e}",
                        ))
                    })?;
                    return Ok(val);
                }
                Ok(value.to_string())
            }
        }

        let explorer_api_key =
            deserializer.deserialize_str(ExplorerApiKeyVisitor)?;
        Ok(Self(explorer_api_key))
    }
}
