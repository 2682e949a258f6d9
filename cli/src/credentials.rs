use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use anyhow::Result;
use checks4shell_core::auth::InstallationTokenSource;
use checks4shell_core::auth::StaticToken;
use checks4shell_core::auth::TokenSource;
use checks4shell_core::checks::ChecksService;
use checks4shell_core::checks::DEFAULT_API_URL;
use checks4shell_core::checks::GithubChecksClient;
use checks4shell_core::checks::LocalChecksService;
use clap::Args;
use tracing::info;

/// How the tool authenticates against GitHub. With none of these set, check
/// runs are only printed locally.
#[derive(Debug, Clone, Args)]
pub struct CredentialArgs {
    /// Path to the PEM encoded private key of a GitHub App.
    #[arg(
        long,
        global = true,
        env = "CHECKS4SHELL_GITHUB_APP_PRIVATE_KEY",
        value_name = "FILE"
    )]
    pub github_app_private_key: Option<PathBuf>,

    #[arg(long, global = true, env = "CHECKS4SHELL_GITHUB_APP_ID", value_name = "ID")]
    pub github_app_id: Option<String>,

    #[arg(
        long,
        global = true,
        env = "CHECKS4SHELL_GITHUB_APP_INSTALLATION_ID",
        value_name = "ID"
    )]
    pub github_app_installation_id: Option<u64>,

    /// Token used as is, e.g. the `GITHUB_TOKEN` of a workflow.
    #[arg(
        long,
        global = true,
        env = "CHECKS4SHELL_GITHUB_TOKEN",
        hide_env_values = true,
        value_name = "TOKEN"
    )]
    pub github_token: Option<String>,

    #[arg(
        long,
        global = true,
        env = "CHECKS4SHELL_GITHUB_API_URL",
        default_value = DEFAULT_API_URL,
        value_name = "URL"
    )]
    pub github_api_url: String,
}

impl CredentialArgs {
    /// Picks the reporting backend: GitHub App, then static token, then local.
    pub fn checks_service(&self, debug: bool) -> Result<Arc<dyn ChecksService>> {
        let Some(tokens) = self.token_source()? else {
            info!("no GitHub credentials configured; check runs stay local");
            return Ok(Arc::new(LocalChecksService::new(debug)));
        };
        Ok(Arc::new(
            GithubChecksClient::new(tokens).with_api_url(self.github_api_url.clone()),
        ))
    }

    fn token_source(&self) -> Result<Option<Arc<dyn TokenSource>>> {
        if let Some(key_path) = &self.github_app_private_key {
            let app_id = self
                .github_app_id
                .clone()
                .context("--github-app-id is required with --github-app-private-key")?;
            let installation_id = self.github_app_installation_id.context(
                "--github-app-installation-id is required with --github-app-private-key",
            )?;
            let pem = std::fs::read(key_path)
                .with_context(|| format!("failed to read {}", key_path.display()))?;
            let source = InstallationTokenSource::new(app_id, installation_id, &pem)
                .with_context(|| format!("invalid GitHub App key {}", key_path.display()))?
                .with_api_url(self.github_api_url.clone());
            return Ok(Some(Arc::new(source)));
        }

        Ok(self
            .github_token
            .as_ref()
            .map(|token| Arc::new(StaticToken::new(token.clone())) as Arc<dyn TokenSource>))
    }
}
