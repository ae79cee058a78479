//! `extforge config`: configuration management commands.

use extforge_config::AppConfig;

pub async fn validate() -> Result<(), Box<dyn std::error::Error>> {
    println!("🔍 Validating configuration...");

    match AppConfig::load() {
        Ok(config) => {
            println!("   ✅ Config parsed successfully");

            let warnings = config.warnings();
            if warnings.is_empty() {
                println!("   ✅ All checks passed");
            } else {
                println!();
                for w in &warnings {
                    println!("   ⚠️  {w}");
                }
            }

            println!();
            println!("   Provider:        {}", config.default_provider);
            println!("   Model:           {}", config.model_for(&config.default_provider));
            println!("   Max iterations:  {}", config.agent.max_iterations);
            println!("   Build timeout:   {}s", config.sandbox.build_timeout_secs);
        }
        Err(e) => {
            println!("   ❌ Config error: {e}");
            return Err(e.into());
        }
    }

    Ok(())
}

pub async fn show() -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    // Never print secrets
    if config.api_key.is_some() {
        config.api_key = Some("[REDACTED]".into());
    }
    if config.session_token.is_some() {
        config.session_token = Some("[REDACTED]".into());
    }
    for provider in config.providers.values_mut() {
        if provider.api_key.is_some() {
            provider.api_key = Some("[REDACTED]".into());
        }
    }

    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

pub async fn path() -> Result<(), Box<dyn std::error::Error>> {
    let config_path = AppConfig::config_dir().join("config.toml");
    println!("{}", config_path.display());
    Ok(())
}

pub async fn init() -> Result<(), Box<dyn std::error::Error>> {
    let config_dir = AppConfig::config_dir();
    let config_path = config_dir.join("config.toml");

    if config_path.exists() {
        println!("⚠️  Config already exists at: {}", config_path.display());
        println!("   Edit it manually or delete it and run `extforge config init` again.");
        return Ok(());
    }

    std::fs::create_dir_all(&config_dir)?;
    std::fs::write(&config_path, AppConfig::default_toml())?;
    println!("✅ Created config.toml at: {}", config_path.display());
    println!();
    println!("📝 Next steps:");
    println!("   1. Edit {} and add your API key", config_path.display());
    println!("   2. Run: extforge chat --dir ./my-extension");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use extforge_config::ProviderConfig;

    #[test]
    fn config_path_is_valid() {
        let path = AppConfig::config_dir().join("config.toml");
        assert!(path.to_str().unwrap().contains(".extforge"));
    }

    #[test]
    fn missing_key_is_warned() {
        let config = AppConfig::default();
        let warnings = config.warnings();
        assert!(warnings.iter().any(|w| w.contains("No API key")));
    }

    #[test]
    fn proxy_without_session_token_is_warned() {
        let mut config = AppConfig::default();
        config.api_key = Some("sk-test".into());
        config.workspace.allowed_commands = vec!["npm".into()];
        config.providers.insert(
            "groq".into(),
            ProviderConfig {
                proxy_url: Some("https://proxy.example.com/chat".into()),
                ..ProviderConfig::default()
            },
        );

        let warnings = config.warnings();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("session_token"));
    }
}
