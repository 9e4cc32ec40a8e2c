use chrono::{DateTime, SecondsFormat, Utc};
use tracing::warn;

/// 生成本地 ID（`temp_` 前缀用于草稿会话，`msg_` 前缀用于本地消息）
pub fn generate_local_id(prefix: &str) -> String {
    let nanos = Utc::now().timestamp_nanos_opt().unwrap_or_default();
    let rand = uuid::Uuid::new_v4().simple().to_string();
    format!("{}_{}_{}", prefix, nanos, &rand[..10])
}

/// 解析 ISO-8601 时间字符串；无法解析时回退到当前时间
pub fn parse_timestamp(s: &str) -> DateTime<Utc> {
    match DateTime::parse_from_rfc3339(s) {
        Ok(dt) => dt.with_timezone(&Utc),
        Err(_) => match chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
            // 服务器有时返回不带时区的时间，按 UTC 处理
            Ok(naive) => naive.and_utc(),
            Err(e) => {
                warn!("[Serde] 无法解析时间 {:?}: {}，使用当前时间", s, e);
                Utc::now()
            }
        },
    }
}

/// 格式化为 ISO-8601 字符串（毫秒精度）
pub fn format_timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// 解码 data URL（`data:<mime>;base64,<payload>`），返回 MIME 类型和字节
pub fn decode_data_url(url: &str) -> Option<(String, Vec<u8>)> {
    use base64::Engine;

    let rest = url.strip_prefix("data:")?;
    let (header, payload) = rest.split_once(',')?;
    let mime = header
        .split(';')
        .next()
        .filter(|m| !m.is_empty())
        .unwrap_or("application/octet-stream")
        .to_string();

    if !header.ends_with(";base64") {
        return Some((mime, payload.as_bytes().to_vec()));
    }

    match base64::engine::general_purpose::STANDARD.decode(payload) {
        Ok(bytes) => Some((mime, bytes)),
        Err(e) => {
            warn!("[Serde] data URL base64 解码失败: {}", e);
            None
        }
    }
}

/// 将字节编码为 data URL
pub fn encode_data_url(mime: &str, bytes: &[u8]) -> String {
    use base64::Engine;
    format!(
        "data:{};base64,{}",
        mime,
        base64::engine::general_purpose::STANDARD.encode(bytes)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn local_ids_are_unique_and_prefixed() {
        let a = generate_local_id("msg");
        let b = generate_local_id("msg");
        assert!(a.starts_with("msg_"));
        assert_ne!(a, b);
    }

    #[test]
    fn timestamps_round_trip_through_iso_strings() {
        let dt = parse_timestamp("2025-03-04T05:06:07.123Z");
        assert_eq!(format_timestamp(&dt), "2025-03-04T05:06:07.123Z");

        let naive = parse_timestamp("2025-03-04T05:06:07.5");
        assert_eq!(format_timestamp(&naive), "2025-03-04T05:06:07.500Z");
    }

    #[test]
    fn data_urls_decode() {
        let url = encode_data_url("image/png", b"\x89PNG");
        let (mime, bytes) = decode_data_url(&url).unwrap();
        assert_eq!(mime, "image/png");
        assert_eq!(bytes, b"\x89PNG");

        assert!(decode_data_url("https://example.com/a.png").is_none());
        assert!(decode_data_url("data:image/png;base64,***").is_none());
    }
}
