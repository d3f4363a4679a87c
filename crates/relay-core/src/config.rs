use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use crate::{domain::UserId, errors::Error, Result};

const DEFAULT_MAX_FILE_SIZE: u64 = 4 * 1024 * 1024 * 1024; // 4GB

/// Typed configuration for the relay.
#[derive(Clone, Debug)]
pub struct Config {
    // Telegram
    pub telegram_bot_token: String,
    /// Custom Bot API server. The public cloud API refuses downloads above 20MB.
    pub telegram_api_url: Option<String>,
    pub admin_user_ids: Vec<i64>,

    // GitHub
    pub github_token: String,
    pub github_repo: String,
    pub github_release_tag: String,
    pub github_api_url: String,

    // Transfers
    pub max_file_size: u64,
    pub temp_dir: PathBuf,
    pub connect_timeout: Duration,

    // Progress reporting
    pub progress_min_percent: f64,
    pub progress_min_interval: Duration,
    pub progress_tick: Duration,

    // Listing
    pub list_page_size: usize,

    // Health endpoint
    pub health_enabled: bool,
    pub health_addr: String,
}

impl Config {
    pub fn load() -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        let cfg = Self::from_lookup(|key| env::var(key).ok())?;
        fs::create_dir_all(&cfg.temp_dir)?;
        Ok(cfg)
    }

    /// Build a config from an arbitrary key lookup (the process env in production).
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let str_of = |key: &str| get(key).and_then(non_empty);
        let required = |key: &str| {
            str_of(key)
                .map(|s| s.trim().to_string())
                .ok_or_else(|| Error::Config(format!("{key} environment variable is required")))
        };

        let telegram_bot_token = required("TELEGRAM_BOT_TOKEN")?;
        let telegram_api_url = str_of("TELEGRAM_API_URL");

        let admin_user_ids = parse_csv_i64(str_of("ADMIN_USER_IDS"))?;
        if admin_user_ids.is_empty() {
            return Err(Error::Config(
                "ADMIN_USER_IDS must list at least one admin user id".to_string(),
            ));
        }

        let github_token = required("GITHUB_TOKEN")?;
        let github_repo = required("GITHUB_REPO")?;
        if !is_valid_repo(&github_repo) {
            return Err(Error::Config(format!(
                "GITHUB_REPO must look like owner/name, got {github_repo:?}"
            )));
        }
        let github_release_tag = required("GITHUB_RELEASE_TAG")?;
        let github_api_url = str_of("GITHUB_API_URL")
            .map(|s| s.trim().trim_end_matches('/').to_string())
            .unwrap_or_else(|| "https://api.github.com".to_string());

        let max_file_size = parse_num::<u64>(&get, "MAX_FILE_SIZE")?.unwrap_or(DEFAULT_MAX_FILE_SIZE);
        let temp_dir = PathBuf::from(
            str_of("TEMP_DIR").unwrap_or_else(|| "/tmp/release-relay".to_string()),
        );
        let connect_timeout =
            Duration::from_secs(parse_num::<u64>(&get, "CONNECT_TIMEOUT_SECS")?.unwrap_or(30));

        let progress_min_percent =
            parse_num::<f64>(&get, "PROGRESS_MIN_PERCENT")?.unwrap_or(2.0).clamp(0.0, 100.0);
        let progress_min_interval = Duration::from_millis(
            parse_num::<u64>(&get, "PROGRESS_MIN_INTERVAL_MS")?.unwrap_or(2_000),
        );
        let progress_tick =
            Duration::from_millis(parse_num::<u64>(&get, "PROGRESS_TICK_MS")?.unwrap_or(500).max(50));

        let list_page_size = parse_num::<usize>(&get, "LIST_PAGE_SIZE")?
            .unwrap_or(20)
            .clamp(1, 50);

        let health_enabled = get("HEALTH_ENABLED").map(|s| parse_bool(&s)).unwrap_or(true);
        let health_addr = str_of("HEALTH_ADDR").unwrap_or_else(|| "0.0.0.0:5000".to_string());

        Ok(Self {
            telegram_bot_token,
            telegram_api_url,
            admin_user_ids,
            github_token,
            github_repo,
            github_release_tag,
            github_api_url,
            max_file_size,
            temp_dir,
            connect_timeout,
            progress_min_percent,
            progress_min_interval,
            progress_tick,
            list_page_size,
            health_enabled,
            health_addr,
        })
    }

    pub fn is_admin(&self, user_id: UserId) -> bool {
        crate::security::is_admin(Some(user_id), &self.admin_user_ids)
    }
}

/// Export `KEY=value` pairs from a `.env` file without overriding variables
/// already set in the process environment.
fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };
    for (key, val) in parse_dotenv(&contents) {
        if env::var_os(&key).is_none() {
            env::set_var(key, val);
        }
    }
}

fn parse_dotenv(contents: &str) -> Vec<(String, String)> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let (key, val) = line.split_once('=')?;
            let key = key.trim().trim_start_matches("export ").trim();
            if key.is_empty() {
                return None;
            }
            Some((key.to_string(), unquote(val.trim()).to_string()))
        })
        .collect()
}

fn unquote(val: &str) -> &str {
    for q in ['"', '\''] {
        if let Some(inner) = val.strip_prefix(q).and_then(|v| v.strip_suffix(q)) {
            return inner;
        }
    }
    val
}

fn parse_bool(s: &str) -> bool {
    matches!(
        s.trim().to_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

fn parse_num<T: std::str::FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>> {
    let Some(raw) = get(key).and_then(non_empty) else {
        return Ok(None);
    };
    raw.trim()
        .parse::<T>()
        .map(Some)
        .map_err(|_| Error::Config(format!("{key} must be a number, got {raw:?}")))
}

fn parse_csv_i64(v: Option<String>) -> Result<Vec<i64>> {
    v.unwrap_or_default()
        .split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<i64>().map_err(|_| {
                Error::Config("ADMIN_USER_IDS must be comma-separated integers".to_string())
            })
        })
        .collect()
}

fn is_valid_repo(repo: &str) -> bool {
    let mut parts = repo.split('/');
    matches!(
        (parts.next(), parts.next(), parts.next()),
        (Some(owner), Some(name), None) if !owner.is_empty() && !name.is_empty()
    )
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn base_env() -> HashMap<&'static str, String> {
        HashMap::from([
            ("TELEGRAM_BOT_TOKEN", "123:abc".to_string()),
            ("GITHUB_TOKEN", "ghp_x".to_string()),
            ("GITHUB_REPO", "octo/storage".to_string()),
            ("GITHUB_RELEASE_TAG", "files".to_string()),
            ("ADMIN_USER_IDS", "42, 7".to_string()),
        ])
    }

    fn load(env: &HashMap<&'static str, String>) -> Result<Config> {
        Config::from_lookup(|k| env.get(k).cloned())
    }

    #[test]
    fn loads_defaults() {
        let cfg = load(&base_env()).unwrap();
        assert_eq!(cfg.admin_user_ids, vec![42, 7]);
        assert_eq!(cfg.max_file_size, DEFAULT_MAX_FILE_SIZE);
        assert_eq!(cfg.github_api_url, "https://api.github.com");
        assert_eq!(cfg.progress_min_interval, Duration::from_secs(2));
        assert_eq!(cfg.list_page_size, 20);
        assert!(cfg.health_enabled);
        assert!(cfg.is_admin(UserId(7)));
        assert!(!cfg.is_admin(UserId(8)));
    }

    #[test]
    fn parses_dotenv_lines() {
        let pairs = parse_dotenv(
            "# comment\n\nGITHUB_REPO=octo/files\nexport MAX_FILE_SIZE = 1024\nTOKEN=\"a=b\"\nNAME='x'\n=orphan\nnoequals\n",
        );
        assert_eq!(
            pairs,
            vec![
                ("GITHUB_REPO".to_string(), "octo/files".to_string()),
                ("MAX_FILE_SIZE".to_string(), "1024".to_string()),
                ("TOKEN".to_string(), "a=b".to_string()),
                ("NAME".to_string(), "x".to_string()),
            ]
        );
    }

    #[test]
    fn rejects_missing_required() {
        let mut env = base_env();
        env.remove("GITHUB_RELEASE_TAG");
        let err = load(&env).unwrap_err();
        assert!(err.to_string().contains("GITHUB_RELEASE_TAG"));
    }

    #[test]
    fn rejects_bad_admin_ids() {
        let mut env = base_env();
        env.insert("ADMIN_USER_IDS", "42,abc".to_string());
        assert!(load(&env).is_err());

        env.insert("ADMIN_USER_IDS", " , ".to_string());
        assert!(load(&env).is_err());
    }

    #[test]
    fn rejects_malformed_repo() {
        let mut env = base_env();
        env.insert("GITHUB_REPO", "no-slash".to_string());
        assert!(load(&env).is_err());
        env.insert("GITHUB_REPO", "a/b/c".to_string());
        assert!(load(&env).is_err());
    }

    #[test]
    fn parses_overrides() {
        let mut env = base_env();
        env.insert("MAX_FILE_SIZE", "1024".to_string());
        env.insert("HEALTH_ENABLED", "off".to_string());
        env.insert("GITHUB_API_URL", "http://localhost:9000/".to_string());
        let cfg = load(&env).unwrap();
        assert_eq!(cfg.max_file_size, 1024);
        assert!(!cfg.health_enabled);
        assert_eq!(cfg.github_api_url, "http://localhost:9000");

        env.insert("MAX_FILE_SIZE", "lots".to_string());
        assert!(load(&env).is_err());
    }
}
