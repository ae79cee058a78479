//! `extforge providers`: list AI providers and their configuration state.

use extforge_config::AppConfig;
use extforge_providers::router::default_base_url;

/// One row of the provider table.
struct ProviderRow {
    name: String,
    base_url: String,
    model: String,
    configured: bool,
    is_default: bool,
}

fn rows(config: &AppConfig) -> Vec<ProviderRow> {
    let router = extforge_providers::build_from_config(config);
    router
        .list()
        .into_iter()
        .map(|name| ProviderRow {
            name: name.to_string(),
            base_url: config
                .providers
                .get(name)
                .and_then(|p| p.api_url.clone())
                .unwrap_or_else(|| default_base_url(name)),
            model: config
                .providers
                .get(name)
                .and_then(|p| p.default_model.clone())
                .unwrap_or_else(|| {
                    if name == config.default_provider {
                        config.default_model.clone()
                    } else {
                        "(adapter default)".into()
                    }
                }),
            configured: router.get(name).is_some_and(|p| p.is_configured()),
            is_default: name == config.default_provider,
        })
        .collect()
}

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    println!("AI Providers");
    println!("============");
    println!();
    println!("  {:<2}{:<12} {:<48} {:<28} Ready", "", "Provider", "Base URL", "Model");
    for row in rows(&config) {
        println!(
            "  {:<2}{:<12} {:<48} {:<28} {}",
            if row.is_default { "*" } else { "" },
            row.name,
            row.base_url,
            row.model,
            if row.configured { "yes" } else { "no key" }
        );
    }
    println!();
    println!("  * default provider ({})", config.default_provider);
    println!();
    println!("  Custom endpoints:");
    println!("    Any OpenAI-compatible API works out of the box:");
    println!("    [providers.my-endpoint]");
    println!("    api_url = \"https://your-custom-endpoint.com/v1\"");
    println!("    api_key = \"your-key\"");
    println!();
    println!("  Environment variables:");
    println!("    OPENAI_API_KEY, ANTHROPIC_API_KEY, GEMINI_API_KEY, OPENROUTER_API_KEY");
    println!("    EXTFORGE_API_KEY, EXTFORGE_PROVIDER, EXTFORGE_MODEL");

    Ok(())
}
