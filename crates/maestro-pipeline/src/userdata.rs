//! User-data assembly
//!
//! The boot-time script embedded into the launch configuration. The
//! `export HASH=<hash>` token is load-bearing: the next deployment recovers
//! the predecessor's configuration version by applying
//! `export HASH=([^\s]+)` to the base64-decoded user-data of the ASG it is
//! replacing.

use base64::Engine;
use maestro_types::Deployment;
use regex::Regex;
use std::sync::OnceLock;

fn hash_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"export HASH=([^\s]+)").unwrap())
}

/// Render the plain-text boot script for a deployment's new state.
pub fn generate(deployment: &Deployment) -> String {
    let mut lines = vec![
        "#!/bin/bash".to_string(),
        format!("export CLOUD_APP={}", deployment.application),
        format!(
            "export CLOUD_CLUSTER={}-{}",
            deployment.application, deployment.environment
        ),
        format!("export CLOUD_ENVIRONMENT={}", deployment.environment),
    ];
    if let Some(hash) = &deployment.new_state.hash {
        lines.push(format!("export HASH={hash}"));
    }
    if let Some(launch_data) = &deployment.new_state.tyranitar.launch_data {
        lines.extend(launch_data.iter().cloned());
    }
    let mut script = lines.join("\n");
    script.push('\n');
    script
}

/// Base64-encode a user-data script for the launch configuration form.
pub fn encode(script: &str) -> String {
    base64::engine::general_purpose::STANDARD.encode(script)
}

/// Recover the hash marker from base64-encoded user-data.
pub fn extract_hash(encoded_user_data: &str) -> Option<String> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded_user_data.trim())
        .ok()?;
    let decoded = String::from_utf8(bytes).ok()?;
    hash_pattern()
        .captures(&decoded)
        .map(|captures| captures[1].to_string())
}
