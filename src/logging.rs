// ==========================================
// 再制造工厂仿真 - 日志初始化
// ==========================================
// RUST_LOG   过滤器（缺省 info，例如 reassembly_sim::engine=debug）
// LOG_FORMAT text | json；json 输出每行一条结构化事件，
//            tick 日志中的 factory_id / sim_minute 字段随之落盘
// ==========================================

use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_FILTER: &str = "info";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    /// 未识别的取值回退为 Text
    pub fn parse(raw: Option<&str>) -> Self {
        match raw.map(str::trim) {
            Some(v) if v.eq_ignore_ascii_case("json") => LogFormat::Json,
            _ => LogFormat::Text,
        }
    }

    fn from_env() -> Self {
        LogFormat::parse(std::env::var("LOG_FORMAT").ok().as_deref())
    }
}

/// 安装全局 subscriber；重复调用时静默忽略
pub fn init() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let installed = match LogFormat::from_env() {
        LogFormat::Json => fmt()
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_env_filter(filter)
            .try_init(),
        LogFormat::Text => fmt()
            .compact()
            .with_env_filter(filter)
            .with_line_number(true)
            .try_init(),
    };

    if installed.is_err() {
        tracing::debug!("日志系统已初始化，跳过");
    }
}

/// 测试用：debug 级别写入测试输出，可被多个测试重复调用
pub fn init_test() {
    let _ = fmt()
        .with_env_filter(EnvFilter::new("debug"))
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_format_parse() {
        assert_eq!(LogFormat::parse(Some(" JSON ")), LogFormat::Json);
        assert_eq!(LogFormat::parse(Some("pretty")), LogFormat::Text);
        assert_eq!(LogFormat::parse(None), LogFormat::Text);
    }
}
