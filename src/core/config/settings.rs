use std::path::PathBuf;

use super::parsing::{
    is_supported_image_extension, parse_cors_origins, parse_environment, parse_ratio,
    parse_f64, parse_store_backend, parse_string_list, parse_u16, parse_u32, parse_u64, Source,
};
use super::types::{
    AnalysisSettings, ApiSettings, ConfigError, CorsSettings, DatabaseSettings,
    RecognitionSettings, RedisSettings, ReportSettings, RuntimeSettings, ServerHost, ServerPort,
    ServerSettings, Settings, StorageSettings, StoreBackend, TelemetrySettings,
};

impl Settings {
    pub(crate) fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(&|key: &str| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: &dyn Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let source = Source::new(lookup);

        let host = source.or_default("MARKSCAN_HOST", "0.0.0.0");
        let port = source.or_default("MARKSCAN_PORT", "8000");

        let environment = parse_environment(
            source.optional("MARKSCAN_ENV").or_else(|| source.optional("ENVIRONMENT")),
        );
        let strict_config = source.flag("MARKSCAN_STRICT_CONFIG") || environment.is_production();

        let project_name = source.or_default("PROJECT_NAME", "Markscan API");
        let version = source.or_default("VERSION", env!("CARGO_PKG_VERSION"));
        let api_v1_str = source.or_default("API_V1_STR", "/api/v1");

        let cors_origins = parse_cors_origins(source.optional("BACKEND_CORS_ORIGINS"))?;

        let backend = parse_store_backend(source.optional("STORE_BACKEND"))?;
        let postgres_server = source.or_default("POSTGRES_SERVER", "localhost");
        let postgres_port = parse_u16("POSTGRES_PORT", source.or_default("POSTGRES_PORT", "5432"))?;
        let postgres_user = source.or_default("POSTGRES_USER", "markscan");
        let postgres_password = source.or_default("POSTGRES_PASSWORD", "");
        let postgres_db = source.or_default("POSTGRES_DB", "markscan");
        let database_url = source.optional("DATABASE_URL");

        let redis_host = source.or_default("REDIS_HOST", "localhost");
        let redis_port = parse_u16("REDIS_PORT", source.or_default("REDIS_PORT", "6379"))?;
        let redis_db = parse_u16("REDIS_DB", source.or_default("REDIS_DB", "0"))?;
        let redis_password = source.or_default("REDIS_PASSWORD", "");

        let vision_api_key = source.or_default("VISION_API_KEY", "");
        let vision_base_url = source.or_default("VISION_BASE_URL", "https://api.openai.com/v1");
        let vision_model = source.or_default("VISION_MODEL", "gpt-4o-mini");
        let vision_max_tokens =
            parse_u32("VISION_MAX_TOKENS", source.or_default("VISION_MAX_TOKENS", "2048"))?;
        let vision_temperature =
            parse_f64("VISION_TEMPERATURE", source.or_default("VISION_TEMPERATURE", "0.2"))?;
        let vision_request_timeout = parse_u64(
            "VISION_REQUEST_TIMEOUT",
            source.or_default("VISION_REQUEST_TIMEOUT", "120"),
        )?;
        let retry_delay_seconds = parse_u64(
            "RECOGNITION_RETRY_DELAY_SECONDS",
            source.or_default("RECOGNITION_RETRY_DELAY_SECONDS", "10"),
        )?;
        let max_retries = parse_u32(
            "RECOGNITION_MAX_RETRIES",
            source.or_default("RECOGNITION_MAX_RETRIES", "1"),
        )?;

        let cooldown_every = parse_u32(
            "ANALYSIS_COOLDOWN_EVERY",
            source.or_default("ANALYSIS_COOLDOWN_EVERY", "10"),
        )?;
        let cooldown_seconds = parse_u64(
            "ANALYSIS_COOLDOWN_SECONDS",
            source.or_default("ANALYSIS_COOLDOWN_SECONDS", "25"),
        )?;
        let lease_ttl_seconds = parse_u64(
            "ANALYSIS_LEASE_TTL_SECONDS",
            source.or_default("ANALYSIS_LEASE_TTL_SECONDS", "3600"),
        )?;
        let scratch_dir =
            source.optional("SCRATCH_DIR").map(PathBuf::from).unwrap_or_else(std::env::temp_dir);

        let pass_threshold =
            parse_ratio("REPORT_PASS_THRESHOLD", source.or_default("REPORT_PASS_THRESHOLD", "0.5"))?;
        let outcome_threshold = parse_ratio(
            "REPORT_OUTCOME_THRESHOLD",
            source.or_default("REPORT_OUTCOME_THRESHOLD", "0.5"),
        )?;

        let max_paper_bytes =
            parse_u64("MAX_PAPER_BYTES", source.or_default("MAX_PAPER_BYTES", "1048576"))?;
        let allowed_image_extensions = parse_string_list(
            source.optional("ALLOWED_IMAGE_EXTENSIONS"),
            &["jpg", "jpeg", "png", "webp"],
        );

        let log_level = source.or_default("MARKSCAN_LOG_LEVEL", "info");
        let json = source.flag("MARKSCAN_LOG_JSON");
        let prometheus_enabled = source.flag("PROMETHEUS_ENABLED");

        let settings = Self {
            server: ServerSettings {
                host: ServerHost::parse(host)?,
                port: ServerPort::parse(port)?,
            },
            runtime: RuntimeSettings { environment, strict_config },
            api: ApiSettings { project_name, version, api_v1_str },
            cors: CorsSettings { origins: cors_origins },
            database: DatabaseSettings {
                backend,
                postgres_server,
                postgres_port,
                postgres_user,
                postgres_password,
                postgres_db,
                database_url,
            },
            redis: RedisSettings {
                host: redis_host,
                port: redis_port,
                db: redis_db,
                password: redis_password,
            },
            recognition: RecognitionSettings {
                api_key: vision_api_key,
                base_url: vision_base_url,
                model: vision_model,
                max_tokens: vision_max_tokens,
                temperature: vision_temperature,
                request_timeout_seconds: vision_request_timeout,
                retry_delay_seconds,
                max_retries,
            },
            analysis: AnalysisSettings {
                cooldown_every,
                cooldown_seconds,
                lease_ttl_seconds,
                scratch_dir,
            },
            report: ReportSettings { pass_threshold, outcome_threshold },
            storage: StorageSettings { max_paper_bytes, allowed_image_extensions },
            telemetry: TelemetrySettings { log_level, json, prometheus_enabled },
        };

        settings.validate()?;
        Ok(settings)
    }

    pub(crate) fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host.0, self.server.port.0)
    }

    pub(crate) fn server_host(&self) -> &str {
        &self.server.host.0
    }

    pub(crate) fn server_port(&self) -> u16 {
        self.server.port.0
    }

    pub(crate) fn api(&self) -> &ApiSettings {
        &self.api
    }

    pub(crate) fn cors(&self) -> &CorsSettings {
        &self.cors
    }

    pub(crate) fn database(&self) -> &DatabaseSettings {
        &self.database
    }

    pub(crate) fn redis(&self) -> &RedisSettings {
        &self.redis
    }

    pub(crate) fn recognition(&self) -> &RecognitionSettings {
        &self.recognition
    }

    pub(crate) fn analysis(&self) -> &AnalysisSettings {
        &self.analysis
    }

    pub(crate) fn report(&self) -> &ReportSettings {
        &self.report
    }

    pub(crate) fn storage(&self) -> &StorageSettings {
        &self.storage
    }

    pub(crate) fn telemetry(&self) -> &TelemetrySettings {
        &self.telemetry
    }

    pub(crate) fn runtime(&self) -> &RuntimeSettings {
        &self.runtime
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.storage.allowed_image_extensions.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "ALLOWED_IMAGE_EXTENSIONS",
                value: String::from("<empty>"),
            });
        }

        for extension in &self.storage.allowed_image_extensions {
            if !is_supported_image_extension(extension) {
                return Err(ConfigError::InvalidValue {
                    field: "ALLOWED_IMAGE_EXTENSIONS",
                    value: extension.clone(),
                });
            }
        }

        if self.analysis.cooldown_every == 0 {
            return Err(ConfigError::InvalidValue {
                field: "ANALYSIS_COOLDOWN_EVERY",
                value: "0".to_string(),
            });
        }

        if self.analysis.lease_ttl_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "ANALYSIS_LEASE_TTL_SECONDS",
                value: "0".to_string(),
            });
        }

        if !(0.0..=2.0).contains(&self.recognition.temperature) {
            return Err(ConfigError::InvalidValue {
                field: "VISION_TEMPERATURE",
                value: self.recognition.temperature.to_string(),
            });
        }

        if self.storage.max_paper_bytes == 0 {
            return Err(ConfigError::InvalidValue {
                field: "MAX_PAPER_BYTES",
                value: "0".to_string(),
            });
        }

        if !self.runtime.strict_config {
            return Ok(());
        }

        if self.database.backend == StoreBackend::Postgres
            && self.database.database_url.is_none()
            && self.database.postgres_password.is_empty()
        {
            return Err(ConfigError::MissingSecret("POSTGRES_PASSWORD"));
        }
        if self.recognition.api_key.is_empty() {
            return Err(ConfigError::MissingSecret("VISION_API_KEY"));
        }
        if self.recognition.base_url.is_empty() {
            return Err(ConfigError::MissingSecret("VISION_BASE_URL"));
        }

        Ok(())
    }
}
