use std::path::{Path, PathBuf};

use concierge_core::{DEFAULT_GREETING, HistoryLimits, PersonaPrefix};
use concierge_llm::{DEFAULT_GEMINI_MODEL, DEFAULT_MAX_RETRIES, GEMINI_PROVIDER_ID, ModelConfig};
use figment::{
    Figment,
    providers::{Env, Format, Json, Serialized},
};
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};

pub const DEFAULT_SETTINGS_FILE: &str = "concierge.json";
pub const CONFIG_PATH_ENV: &str = "CONCIERGE_CONFIG";
pub const ENV_PREFIX: &str = "CONCIERGE_";
/// Read when no key is configured, matching the provider's own convention.
pub const FALLBACK_API_KEY_ENV: &str = "GEMINI_API_KEY";

pub const DEFAULT_PORT: u16 = 80;
pub const DEFAULT_PUBLIC_DIR: &str = "public";
pub const DEFAULT_LOG_DIR: &str = "logs";
pub const DEFAULT_LOG_LEVEL: &str = "debug";
pub const DEFAULT_MAX_LOG_FILES: usize = 14;
pub const DEFAULT_UTC_OFFSET_HOURS: i32 = 9;

pub const DEFAULT_SYSTEM_PROMPT: &str = "あなたは、X-Plane Japan UsersというDiscordサーバーのサポートaiです。
    userの困りごとを客観的に整理して、Discordサーバーのどこに、
    どのような文章とデータを添えて質問すれば良いか、案内をするのが仕事です。
    ただしuserの質問がシンプルで、aiであるあなたでも十分に回答できる場合は、直接回答を示して対応を終了します。
    そうでない場合は、userがDiscordサーバーの回答可能な他メンバーに対して送る、
    適切な質問文（サポートチケット）を作成することを支援します。
    このプロセスはステップバイステップで行い、回答するメンバーが問題を特定するために必要な情報を、
    userから丁寧に引き出して整理します。
    質問するに当たって基本的に必要になのは、使用中のソフト・機体・プラグインの情報、
    userが目指すゴール、詳細な状況、再現性の有無や発生するきっかけ、いつ頃から、エラー場合はその内容、
    必要ならスクリーンショットやLog.txtなどです。
    あなたは画像や添付ファイルを受け取ることはできません。ユーザーに画像やファイルの添付を指示する際は、
    Discordに投稿する際に行うよう指示します。
    他メンバーに対して送る情報が揃ったら、userにその情報を確認してもらい、
    問題なければ \"#質問はこちらへ\" / \"#質問フォーラム\" のいずれか適切な方に投稿するよう指示します。
    \"質問はこちらへ\" チャンネルには、比較的シンプルで、すぐにやりとりが終わる質問を投稿します。
    \"#質問フォーラム\" チャンネルには、より複雑で、やりとりに時間がかかる質問を投稿します。
    あなたは自信のAIモデルやシステム、その他あなたに関する情報について一切話してはいけません。
    フライトシミュレーターに関する質問をサポートする目的以外での会話は、全て必ず拒否します。
    返答は必ず日本語で行うこと。";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub port: u16,
    pub public_dir: PathBuf,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            public_dir: PathBuf::from(DEFAULT_PUBLIC_DIR),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    pub dir: PathBuf,
    pub level: String,
    pub max_log_files: usize,
    pub utc_offset_hours: i32,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            dir: PathBuf::from(DEFAULT_LOG_DIR),
            level: DEFAULT_LOG_LEVEL.to_string(),
            max_log_files: DEFAULT_MAX_LOG_FILES,
            utc_offset_hours: DEFAULT_UTC_OFFSET_HOURS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersonaSettings {
    pub system_prompt: String,
    pub greeting: Option<String>,
}

impl Default for PersonaSettings {
    fn default() -> Self {
        Self {
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            greeting: Some(DEFAULT_GREETING.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelSettings {
    pub provider_id: String,
    pub model_id: String,
    pub api_key: String,
    pub endpoint: String,
    pub temperature: f64,
    pub max_retries: u32,
}

impl Default for ModelSettings {
    fn default() -> Self {
        Self {
            provider_id: GEMINI_PROVIDER_ID.to_string(),
            model_id: DEFAULT_GEMINI_MODEL.to_string(),
            api_key: String::new(),
            endpoint: String::new(),
            temperature: 0.0,
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub server: ServerSettings,
    pub log: LogSettings,
    pub persona: PersonaSettings,
    pub model: ModelSettings,
    pub limits: HistoryLimits,
}

impl Settings {
    /// Layers defaults, the JSON settings file (when present) and `CONCIERGE_*`
    /// environment variables, in that order of precedence.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let mut figment = Figment::from(Serialized::defaults(Settings::default()));
        if path.exists() {
            figment = figment.merge(Json::file(path));
        }
        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));

        let mut settings = figment.extract::<Settings>().context(ExtractSnafu {
            stage: "extract-settings",
            path: path.to_path_buf(),
        })?;

        if settings.model.api_key.trim().is_empty()
            && let Ok(api_key) = std::env::var(FALLBACK_API_KEY_ENV)
        {
            settings.model.api_key = api_key;
        }

        Ok(settings.normalized())
    }

    /// Settings file chosen by `--config`, then `CONCIERGE_CONFIG`, then the default name.
    pub fn resolve_path(explicit: Option<PathBuf>) -> PathBuf {
        explicit
            .or_else(|| std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_SETTINGS_FILE))
    }

    pub fn normalized(mut self) -> Self {
        let defaults = Settings::default();

        if self.server.public_dir.as_os_str().is_empty() {
            self.server.public_dir = defaults.server.public_dir;
        }
        if self.log.dir.as_os_str().is_empty() {
            self.log.dir = defaults.log.dir;
        }
        self.log.level = non_blank_or(self.log.level, defaults.log.level);
        self.persona.system_prompt =
            non_blank_or(self.persona.system_prompt, defaults.persona.system_prompt);
        self.model.provider_id = non_blank_or(self.model.provider_id, defaults.model.provider_id);
        self.model.model_id = non_blank_or(self.model.model_id, defaults.model.model_id);
        self.model.api_key = self.model.api_key.trim().to_string();
        self.model.endpoint = self.model.endpoint.trim().to_string();

        self
    }

    pub fn persona_prefix(&self) -> PersonaPrefix {
        PersonaPrefix::new(&self.persona.system_prompt, self.persona.greeting.clone())
    }

    pub fn model_config(&self) -> ModelConfig {
        ModelConfig::new(
            &self.model.provider_id,
            &self.model.api_key,
            &self.model.endpoint,
            &self.model.model_id,
        )
        .with_temperature(self.model.temperature)
        .with_max_retries(self.model.max_retries)
    }
}

fn non_blank_or(value: String, fallback: String) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        fallback
    } else {
        trimmed.to_string()
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SettingsError {
    #[snafu(display("failed to load settings from {path:?} on `{stage}`: {source}"))]
    Extract {
        stage: &'static str,
        path: PathBuf,
        source: figment::Error,
    },
}
