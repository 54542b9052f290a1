//! File templates for the generated worker project
//!
//! Every function here is pure: parameters in, file contents out.

use crate::core::config::ConfigError;
use chrono::NaiveDate;
use serde_json::json;

pub const MANIFEST_FILE: &str = "package.json";
pub const ENTRY_POINT_FILE: &str = "index.js";
pub const DEPLOY_CONFIG_FILE: &str = "wrangler.toml";
pub const GITIGNORE_FILE: &str = ".gitignore";

/// Longest worker name the edge platform accepts
pub const MAX_WORKER_NAME_LEN: usize = 63;

/// Worker name for a project: lowercase letters, digits and '-'
pub fn worker_name(project_name: &str) -> String {
    project_name
        .to_ascii_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .trim_matches('-')
        .to_string()
}

/// Render the package manifest
pub fn render_manifest(project_name: &str) -> String {
    let manifest = json!({
        "name": project_name.to_lowercase(),
        "version": "1.0.0",
        "description": "",
        "main": ENTRY_POINT_FILE,
        "type": "module",
        "scripts": {
            "deploy": "wrangler deploy"
        },
        "keywords": [],
        "author": "",
        "license": "ISC"
    });
    // serde_json::Value always serializes
    let mut text = serde_json::to_string_pretty(&manifest).unwrap_or_default();
    text.push('\n');
    text
}

/// Render the worker entry point
pub fn render_entry_point(project_name: &str) -> String {
    format!(
        r#"import {{ Hono }} from 'hono';

const app = new Hono();

app.get('/', (c) => c.text('Hello from {project_name}!'));

app.get('/robots.txt', (c) => {{
  const robotsTxt = `User-agent: *
Disallow: /`;
  return c.text(robotsTxt, 200, {{
    'Content-Type': 'text/plain',
  }});
}});

export default app;
"#
    )
}

/// Render the deployment config
///
/// The account id is written in plaintext; the platform's config format requires it.
pub fn render_deploy_config(
    project_name: &str,
    account_id: &str,
    compatibility_date: NaiveDate,
) -> Result<String, ConfigError> {
    if account_id.trim().is_empty() {
        return Err(ConfigError::MissingValue("account id"));
    }

    Ok(format!(
        r#"name = "{name}"
main = "{ENTRY_POINT_FILE}"
compatibility_date = "{date}"
account_id = "{account_id}"
workers_dev = true
"#,
        name = worker_name(project_name),
        date = compatibility_date.format("%Y-%m-%d"),
    ))
}

/// Render the ignore file written before the first commit
pub fn render_gitignore() -> String {
    "node_modules/\n.provision/\n.wrangler/\n".to_string()
}
