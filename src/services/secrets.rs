use crate::error::{AppError, Result};

/// Turns a `webhook_secret_ref` from the config into the real endpoint.
pub trait SecretResolve: Send + Sync {
    fn resolve(&self, reference: &str) -> Result<String>;
}

/// Reads the secret from the environment variable the reference names.
#[derive(Debug, Default)]
pub struct EnvSecretResolver;

impl SecretResolve for EnvSecretResolver {
    fn resolve(&self, reference: &str) -> Result<String> {
        match std::env::var(reference) {
            Ok(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
            Ok(_) => Err(AppError::Secret(format!("{} is empty", reference))),
            Err(_) => Err(AppError::Secret(format!("{} is not set", reference))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::{assert_err, assert_ok};

    #[test]
    fn unset_reference_is_secret_error() {
        let err = assert_err!(EnvSecretResolver.resolve("RSS_DIGEST_NOTIFIER_TEST_UNSET_WEBHOOK"));
        assert!(matches!(err, AppError::Secret(_)));
    }

    #[test]
    fn reads_value_from_environment() {
        std::env::set_var("RSS_DIGEST_NOTIFIER_TEST_WEBHOOK", " https://hooks.example/abc ");
        let url = assert_ok!(EnvSecretResolver.resolve("RSS_DIGEST_NOTIFIER_TEST_WEBHOOK"));
        assert_eq!(url, "https://hooks.example/abc");
    }
}
