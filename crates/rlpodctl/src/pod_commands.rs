// Pod command implementations for rlpodctl

use anyhow::{anyhow, bail, Context, Result};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::debug;

use rlpod_core::{
    find_first_manifest_path, format_duration, state, ConnectorRegistry, Pod, PodRegistry,
    RuntimeConfig,
};
use rlpod_spec::PodSpec;

/// Outcome of an action edit
#[derive(Debug, PartialEq, Eq)]
pub enum ActionEdit {
    Added,
    Replaced,
    Kept,
}

pub fn add_action(config: &RuntimeConfig, name: &str, yes: bool) -> Result<()> {
    let path = first_manifest(config)?;
    let edit = append_action(&path, name, config, |question| yes || confirm(question))?;

    match edit {
        ActionEdit::Added => println!("✅ Added action '{}' to {}", name, path.display()),
        ActionEdit::Replaced => println!("✅ Replaced action '{}' in {}", name, path.display()),
        ActionEdit::Kept => println!("Action '{}' left unchanged", name),
    }
    Ok(())
}

pub fn add_rewards(config: &RuntimeConfig) -> Result<()> {
    let path = first_manifest(config)?;
    let count = append_default_rewards(&path, config)?;
    println!("✅ Added {} default rewards to {}", count, path.display());
    Ok(())
}

pub fn show_pod(config: &RuntimeConfig, path: Option<PathBuf>) -> Result<()> {
    let path = manifest_or_first(config, path)?;
    let pod = Pod::load(&path, config).with_context(|| format!("Failed to load {}", path.display()))?;

    println!("📦 Pod: {}", pod.name());
    println!("   Manifest: {}", path.display());
    println!("   Hash: {}", pod.hash());
    println!("   Epoch: {}", pod.epoch().to_rfc3339());
    println!("   Period: {}", format_duration(pod.period()));
    println!("   Interval: {}", format_duration(pod.interval()));
    println!("   Granularity: {}", format_duration(pod.granularity()));

    println!("\nFields:");
    for field in pod.field_names() {
        println!("   {}", field);
    }

    println!("\nActions:");
    for (name, body) in pod.actions()? {
        println!("   {}: {}", name, one_line(&body));
    }

    println!("\nRewards:");
    for (name, body) in pod.rewards()? {
        println!("   {}: {}", name, one_line(&body));
    }
    Ok(())
}

pub async fn fetch_pod(config: &RuntimeConfig, path: Option<PathBuf>) -> Result<()> {
    let path = manifest_or_first(config, path)?;
    let registry = PodRegistry::new();
    let pod = registry.load_pod(&path, config)?;

    let table = registry
        .fetch(pod.name(), &ConnectorRegistry::default())
        .await
        .with_context(|| format!("Failed to fetch data for pod '{}'", pod.name()))?;
    print!("{}", table.to_csv());
    Ok(())
}

pub async fn overlay_state(config: &RuntimeConfig, csv: &Path, path: Option<PathBuf>) -> Result<()> {
    let path = manifest_or_first(config, path)?;
    let text = std::fs::read_to_string(csv)
        .with_context(|| format!("Failed to read {}", csv.display()))?;
    let states = state::from_csv(&text)?;

    let pod = Pod::load(&path, config)?;
    pod.fetch_new_data(&ConnectorRegistry::default())
        .await
        .with_context(|| format!("Failed to fetch data for pod '{}'", pod.name()))?;
    pod.add_local_state(&states).await?;

    let csv = pod
        .cached_csv()
        .await
        .ok_or_else(|| anyhow!("pod '{}' has no cached data", pod.name()))?;
    print!("{}", csv);
    Ok(())
}

/// Append a pod-level action, asking before replacing an existing one
pub fn append_action<F>(path: &Path, name: &str, config: &RuntimeConfig, mut confirm: F) -> Result<ActionEdit>
where
    F: FnMut(&str) -> bool,
{
    let pod = Pod::load(path, config)?;
    let exists = pod.actions()?.contains_key(name);
    if exists && !confirm(&format!("Action '{}' already exists. Overwrite?", name)) {
        return Ok(ActionEdit::Kept);
    }

    let spec = pod.spec().clone().with_action(name);
    write_manifest(path, &spec)?;
    Ok(if exists { ActionEdit::Replaced } else { ActionEdit::Added })
}

/// Attach the default reward to every action; returns how many were added
pub fn append_default_rewards(path: &Path, config: &RuntimeConfig) -> Result<usize> {
    let pod = Pod::load(path, config)?;
    let actions: Vec<String> = pod.actions()?.into_keys().collect();
    let count = actions.len();

    let spec = pod.spec().clone().with_default_rewards(actions)?;
    write_manifest(path, &spec)?;
    Ok(count)
}

fn write_manifest(path: &Path, spec: &PodSpec) -> Result<()> {
    let yaml = spec.to_yaml()?;
    debug!(path = %path.display(), bytes = yaml.len(), "Writing manifest");
    std::fs::write(path, yaml).with_context(|| format!("Failed to write {}", path.display()))
}

fn first_manifest(config: &RuntimeConfig) -> Result<PathBuf> {
    find_first_manifest_path(&config.pods_dir)
        .with_context(|| format!("Failed to scan {}", config.pods_dir.display()))?
        .ok_or_else(|| anyhow!("no pod manifest found in {}", config.pods_dir.display()))
}

fn manifest_or_first(config: &RuntimeConfig, path: Option<PathBuf>) -> Result<PathBuf> {
    match path {
        Some(path) if !path.exists() => bail!("manifest {} not found", path.display()),
        Some(path) => Ok(path),
        None => first_manifest(config),
    }
}

fn confirm(question: &str) -> bool {
    print!("{} (y/n): ", question);
    if std::io::stdout().flush().is_err() {
        return false;
    }
    let mut response = String::new();
    if std::io::stdin().read_line(&mut response).is_err() {
        return false;
    }
    matches!(response.trim().to_lowercase().as_str(), "y" | "yes")
}

fn one_line(body: &str) -> String {
    body.lines().collect::<Vec<_>>().join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use rlpod_spec::RewardsSpec;

    const MANIFEST: &str = "\
name: trader
params:
  epoch: 1605312000
  period: 17h
  interval: 17m
  granularity: 17s
dataSources:
  - from: local
    name: portfolio
    fields:
      - name: usd_balance
        initializer: 1000000
    actions:
      buy: local.portfolio.usd_balance -= 1
actions:
  - name: hold
";

    fn manifest() -> (tempfile::TempDir, PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("trader.yaml");
        std::fs::write(&path, MANIFEST).unwrap();
        (dir, path)
    }

    #[test]
    fn test_append_new_action() {
        let (_dir, path) = manifest();
        let config = RuntimeConfig::default();

        let edit = append_action(&path, "sell", &config, |_| panic!("no prompt expected")).unwrap();
        assert_eq!(edit, ActionEdit::Added);

        let pod = Pod::load(&path, &config).unwrap();
        let actions = pod.actions().unwrap();
        assert_eq!(actions.keys().collect::<Vec<_>>(), ["buy", "hold", "sell"]);
        assert_eq!(pod.field_names(), vec!["local.portfolio.usd_balance".to_string()]);
    }

    #[test]
    fn test_existing_action_needs_confirmation() {
        let (_dir, path) = manifest();
        let config = RuntimeConfig::default();
        let before = std::fs::read_to_string(&path).unwrap();

        let edit = append_action(&path, "hold", &config, |_| false).unwrap();
        assert_eq!(edit, ActionEdit::Kept);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), before);

        let edit = append_action(&path, "hold", &config, |_| true).unwrap();
        assert_eq!(edit, ActionEdit::Replaced);
        let pod = Pod::load(&path, &config).unwrap();
        assert_eq!(pod.spec().actions.len(), 1);
    }

    #[test]
    fn test_default_rewards_written_once() {
        let (_dir, path) = manifest();
        let config = RuntimeConfig::default();

        assert_eq!(append_default_rewards(&path, &config).unwrap(), 2);
        let pod = Pod::load(&path, &config).unwrap();
        assert!(matches!(pod.spec().rewards(), Ok(Some(RewardsSpec::Explicit(r))) if r.len() == 2));
        assert_eq!(pod.rewards().unwrap()["buy"], "reward = 1");

        assert!(append_default_rewards(&path, &config).is_err());
    }
}
