use std::{
    env,
    fmt::Debug,
    fs,
    net::IpAddr,
    path::{Path, PathBuf},
    str::FromStr,
    sync::{Arc, LazyLock},
};

use anyhow::Context;

pub const LLM_API_KEY_ENV: &str = "BUZZIFY_LLM_API_KEY";

pub static GLOBAL: LazyLock<Arc<Conf>> = LazyLock::new(|| {
    let conf = read_or_create_default().unwrap_or_else(|error| {
        panic!("Failed to initialize global config: {error:?}")
    });
    Arc::new(conf)
});

#[must_use]
pub fn global() -> Arc<Conf> {
    (*GLOBAL).clone()
}

#[derive(serde::Serialize, serde::Deserialize, Debug, Clone)]
pub struct Conf {
    #[serde(
        serialize_with = "serialize_log_level",
        deserialize_with = "deserialize_log_level"
    )]
    pub log_level: tracing::Level,
    pub addr: IpAddr,
    pub port: u16,

    /// Name of the cookie carrying the auth provider's session token.
    pub session_cookie: String,

    pub sqlite_busy_timeout: f32,
    pub cors_origins: Vec<String>,

    // Tables last, so the TOML stays valid.
    pub jwt: Jwt,
    pub llm: Llm,
    pub quota: Quota,
    pub tls: Option<Tls>,
}

impl Default for Conf {
    fn default() -> Self {
        Self {
            log_level: tracing::Level::INFO,
            addr: "127.0.0.1".parse().unwrap_or_else(|_| {
                unreachable!("Fat-fingered default IP address!")
            }),
            port: 3001,
            session_cookie: "sb-access-token".to_string(),
            sqlite_busy_timeout: 60.0,
            cors_origins: vec![
                "http://localhost:3000".to_string(),
                "https://localhost:3000".to_string(),
            ],
            jwt: Jwt::default(),
            llm: Llm::default(),
            quota: Quota::default(),
            tls: None,
        }
    }
}

#[derive(serde::Serialize, serde::Deserialize, Debug, Clone)]
pub struct Tls {
    pub cert_file: PathBuf,
    pub key_file: PathBuf,
}

#[derive(serde::Serialize, serde::Deserialize, Clone)]
pub struct Jwt {
    pub secret: String,
    pub audience: String,
    pub issuer: String,
}

impl Default for Jwt {
    fn default() -> Self {
        Self {
            secret: "super-secret".to_string(),
            audience: "authenticated".to_string(),
            issuer: "https://localhost.supabase.co/auth/v1".to_string(),
        }
    }
}

impl Debug for Jwt {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Jwt")
            .field("secret", &"<XXXXX>")
            .field("audience", &self.audience)
            .field("issuer", &self.issuer)
            .finish()
    }
}

#[derive(serde::Serialize, serde::Deserialize, Clone)]
pub struct Llm {
    /// Base URL of an OpenAI-compatible API, without trailing slash.
    pub base_url: String,
    pub model: String,

    /// Pooled key that pays for free-quota requests.
    pub api_key: String,

    pub timeout: f32,
}

impl Default for Llm {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            model: "gpt-5-nano".to_string(),
            api_key: String::new(),
            timeout: 60.0,
        }
    }
}

impl Debug for Llm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Llm")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &"<XXXXX>")
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(serde::Serialize, serde::Deserialize, Debug, Clone)]
pub struct Quota {
    pub free_requests_per_day: u32,
}

impl Default for Quota {
    fn default() -> Self {
        Self {
            free_requests_per_day: crate::quota::DEFAULT_FREE_REQUESTS_PER_DAY,
        }
    }
}

fn serialize_log_level<S>(
    level: &tracing::Level,
    serializer: S,
) -> Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    let s = level.to_string();
    serializer.serialize_str(&s)
}

fn deserialize_log_level<'de, D>(
    deserializer: D,
) -> Result<tracing::Level, D::Error>
where
    D: serde::Deserializer<'de>,
{
    use serde::Deserialize;

    let s = String::deserialize(deserializer)?;
    tracing::Level::from_str(&s).map_err(serde::de::Error::custom)
}

pub fn read_or_create_default() -> anyhow::Result<Conf> {
    let path = "conf/conf.toml";
    let mut conf = read_or_create_default_(path).context(path)?;
    if let Ok(api_key) = env::var(LLM_API_KEY_ENV) {
        if !api_key.is_empty() {
            conf.llm.api_key = api_key;
        }
    }
    Ok(conf)
}

pub fn read_or_create_default_<P: AsRef<Path>>(
    path: P,
) -> anyhow::Result<Conf> {
    let path = path.as_ref();
    let conf = if fs::exists(path)? {
        let s = fs::read_to_string(path)?;
        toml::from_str(&s)?
    } else {
        if let Some(parent) = path.parent() {
            let ctx = format!(
                "Failed to create parent directory \
                for conf file: {path:?}"
            );
            fs::create_dir_all(parent).context(ctx)?;
        }
        let conf = Conf::default();
        let s = toml::to_string_pretty(&conf)?;
        fs::write(path, s)?;
        conf
    };
    Ok(conf)
}
