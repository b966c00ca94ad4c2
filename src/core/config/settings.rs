use super::parsing::{
    env_optional, env_or_default, parse_bool, parse_cors_origins, parse_environment, parse_u16,
    parse_u64,
};
use super::secret::load_or_create_secret_key;
use super::types::{
    AdminSettings, ApiSettings, ConfigError, CorsSettings, DatabaseSettings, ExamSettings,
    RedisSettings, RuntimeSettings, SecuritySettings, ServerHost, ServerPort, ServerSettings,
    Settings, TelemetrySettings,
};

impl Settings {
    pub(crate) fn load() -> Result<Self, ConfigError> {
        let host = env_or_default("MOCKLAB_HOST", "0.0.0.0");
        let port = env_or_default("MOCKLAB_PORT", "8000");

        let environment =
            parse_environment(env_optional("MOCKLAB_ENV").or_else(|| env_optional("ENVIRONMENT")));
        let strict_config =
            env_optional("MOCKLAB_STRICT_CONFIG").map(|value| parse_bool(&value)).unwrap_or(false)
                || environment.is_production();

        let project_name = env_or_default("PROJECT_NAME", "Mocklab API");
        let version = env_or_default("VERSION", env!("CARGO_PKG_VERSION"));
        let api_v1_str = env_or_default("API_V1_STR", "/api/v1");

        let secret_key = match env_optional("SECRET_KEY") {
            Some(value) => value,
            None => load_or_create_secret_key(),
        };

        let access_token_expire_minutes = parse_u64(
            "ACCESS_TOKEN_EXPIRE_MINUTES",
            env_or_default("ACCESS_TOKEN_EXPIRE_MINUTES", "10080"),
        )?;
        let algorithm = env_or_default("ALGORITHM", "HS256");

        let cors_origins = parse_cors_origins(env_optional("BACKEND_CORS_ORIGINS"))?;

        let postgres_server = env_or_default("POSTGRES_SERVER", "localhost");
        let postgres_port = parse_u16("POSTGRES_PORT", env_or_default("POSTGRES_PORT", "5432"))?;
        let postgres_user = env_or_default("POSTGRES_USER", "mocklabsuperuser");
        let postgres_password = env_or_default("POSTGRES_PASSWORD", "");
        let postgres_db = env_or_default("POSTGRES_DB", "mocklab_db");
        let database_url = env_optional("DATABASE_URL");

        let redis_host = env_or_default("REDIS_HOST", "localhost");
        let redis_port = parse_u16("REDIS_PORT", env_or_default("REDIS_PORT", "6379"))?;
        let redis_db = parse_u16("REDIS_DB", env_or_default("REDIS_DB", "0"))?;
        let redis_password = env_or_default("REDIS_PASSWORD", "");

        let sync_interval_seconds = parse_u64(
            "MOCKLAB_SYNC_INTERVAL_SECONDS",
            env_or_default("MOCKLAB_SYNC_INTERVAL_SECONDS", "30"),
        )?;
        let sweep_interval_seconds = parse_u64(
            "MOCKLAB_SWEEP_INTERVAL_SECONDS",
            env_or_default("MOCKLAB_SWEEP_INTERVAL_SECONDS", "15"),
        )?;
        let submit_grace_seconds = parse_u64(
            "MOCKLAB_SUBMIT_GRACE_SECONDS",
            env_or_default("MOCKLAB_SUBMIT_GRACE_SECONDS", "30"),
        )?;
        let allow_paste =
            env_optional("MOCKLAB_ALLOW_PASTE").map(|value| parse_bool(&value)).unwrap_or(false);

        let first_superuser_username = env_or_default("FIRST_SUPERUSER_USERNAME", "admin");
        let first_superuser_password = env_or_default("FIRST_SUPERUSER_PASSWORD", "");

        let log_level = env_or_default("MOCKLAB_LOG_LEVEL", "info");
        let json = env_optional("MOCKLAB_LOG_JSON").map(|value| parse_bool(&value)).unwrap_or(false);
        let prometheus_enabled =
            env_optional("PROMETHEUS_ENABLED").map(|value| parse_bool(&value)).unwrap_or(false);

        let settings = Self {
            server: ServerSettings {
                host: ServerHost::parse(host)?,
                port: ServerPort::parse(port)?,
            },
            runtime: RuntimeSettings { environment, strict_config },
            api: ApiSettings { project_name, version, api_v1_str },
            security: SecuritySettings { secret_key, access_token_expire_minutes, algorithm },
            cors: CorsSettings { origins: cors_origins },
            database: DatabaseSettings {
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
            exam: ExamSettings {
                sync_interval_seconds,
                sweep_interval_seconds,
                submit_grace_seconds,
                allow_paste,
            },
            admin: AdminSettings { first_superuser_username, first_superuser_password },
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

    pub(crate) fn security(&self) -> &SecuritySettings {
        &self.security
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

    pub(crate) fn exam(&self) -> &ExamSettings {
        &self.exam
    }

    pub(crate) fn admin(&self) -> &AdminSettings {
        &self.admin
    }

    pub(crate) fn telemetry(&self) -> &TelemetrySettings {
        &self.telemetry
    }

    pub(crate) fn runtime(&self) -> &RuntimeSettings {
        &self.runtime
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.exam.sync_interval_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "MOCKLAB_SYNC_INTERVAL_SECONDS",
                value: "0".to_string(),
            });
        }

        if self.exam.sweep_interval_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "MOCKLAB_SWEEP_INTERVAL_SECONDS",
                value: "0".to_string(),
            });
        }

        if !(self.runtime.strict_config || self.runtime.environment.is_production()) {
            return Ok(());
        }

        if self.database.database_url.is_none() && self.database.postgres_password.is_empty() {
            return Err(ConfigError::MissingSecret("POSTGRES_PASSWORD"));
        }
        if self.admin.first_superuser_password.is_empty() {
            return Err(ConfigError::MissingSecret("FIRST_SUPERUSER_PASSWORD"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::Settings;
    use crate::test_support;

    #[test]
    fn load_applies_exam_defaults() {
        let _guard = test_support::env_lock();
        std::env::remove_var("MOCKLAB_SYNC_INTERVAL_SECONDS");
        std::env::remove_var("MOCKLAB_SWEEP_INTERVAL_SECONDS");
        std::env::remove_var("MOCKLAB_ALLOW_PASTE");
        std::env::set_var("SECRET_KEY", "test-secret");
        std::env::set_var("MOCKLAB_ENV", "test");

        let settings = Settings::load().expect("settings");
        assert_eq!(settings.exam().sync_interval_seconds, 30);
        assert_eq!(settings.exam().sweep_interval_seconds, 15);
        assert!(!settings.exam().allow_paste);
    }

    #[test]
    fn load_rejects_zero_sync_interval() {
        let _guard = test_support::env_lock();
        std::env::set_var("SECRET_KEY", "test-secret");
        std::env::set_var("MOCKLAB_ENV", "test");
        std::env::set_var("MOCKLAB_SYNC_INTERVAL_SECONDS", "0");

        let result = Settings::load();
        std::env::remove_var("MOCKLAB_SYNC_INTERVAL_SECONDS");
        assert!(result.is_err());
    }
}
