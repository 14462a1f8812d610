use crate::model::ScheduleType;
use crate::{MbmError, Result};
use chrono::{DateTime, NaiveTime, Timelike, Utc};
use chrono_tz::Tz;
use cron::Schedule;
use serde::Deserialize;
use std::str::FromStr;

/// 任务调度配置，持久化为 JSON，在注册时解析
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScheduleConfig {
    /// "HH:MM"，缺省 02:00
    pub time: Option<String>,
    /// 0 = 周日，1 = 周一，……，6 = 周六
    pub weekday: Option<u8>,
    /// 每月几号，1..=31
    pub day: Option<u32>,
    /// cron 表达式（5 或 6 字段）
    pub expression: Option<String>,
    /// IANA 时区名，缺省 UTC
    pub timezone: Option<String>,
}

impl ScheduleConfig {
    pub fn parse_json(raw: &str) -> Result<Self> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(raw)
            .map_err(|e| MbmError::schedule(format!("调度配置解析失败: {e}")))
    }
}

const DEFAULT_TIME: &str = "02:00";

// cron crate 的周字段用名字最不容易混淆；0 = 周日与原始配置保持一致
const WEEKDAY_NAMES: [&str; 7] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"];

/// 解析后的执行规则
#[derive(Debug, Clone)]
pub enum ScheduleRule {
    /// 注册后立即执行一次
    Once,
    /// 周期执行，daily/weekly/monthly 同样编译为 cron 规则
    Recurring { schedule: Schedule, timezone: Tz },
}

impl ScheduleRule {
    /// 根据调度类型和配置解析执行规则；所有校验错误在这里出现，
    /// 不会推迟到触发时刻
    pub fn parse(schedule_type: ScheduleType, config: &ScheduleConfig) -> Result<Self> {
        if schedule_type == ScheduleType::Once {
            return Ok(ScheduleRule::Once);
        }

        let timezone_name = config.timezone.as_deref().unwrap_or("UTC");
        let timezone: Tz = timezone_name
            .parse()
            .map_err(|_| MbmError::schedule(format!("无效的时区: {timezone_name}")))?;

        let expression = match schedule_type {
            ScheduleType::Once => unreachable!(),
            ScheduleType::Daily => {
                let (hour, minute) = parse_time(config.time.as_deref())?;
                format!("0 {minute} {hour} * * * *")
            }
            ScheduleType::Weekly => {
                let (hour, minute) = parse_time(config.time.as_deref())?;
                let weekday = config.weekday.unwrap_or(0);
                let name = WEEKDAY_NAMES
                    .get(weekday as usize)
                    .ok_or_else(|| MbmError::schedule(format!("无效的星期: {weekday}")))?;
                format!("0 {minute} {hour} * * {name} *")
            }
            ScheduleType::Monthly => {
                let (hour, minute) = parse_time(config.time.as_deref())?;
                let day = config
                    .day
                    .ok_or_else(|| MbmError::schedule("monthly 调度缺少 day"))?;
                if !(1..=31).contains(&day) {
                    return Err(MbmError::schedule(format!("无效的日期: {day}")));
                }
                format!("0 {minute} {hour} {day} * * *")
            }
            ScheduleType::Cron => {
                let raw = config
                    .expression
                    .as_deref()
                    .filter(|e| !e.trim().is_empty())
                    .ok_or_else(|| MbmError::schedule("cron 调度缺少 expression"))?;
                convert_cron_expression(raw)
            }
        };

        let schedule = Schedule::from_str(&expression)
            .map_err(|e| MbmError::schedule(format!("cron 表达式无效: {e}")))?;

        Ok(ScheduleRule::Recurring { schedule, timezone })
    }

    /// 计算 after 之后的下一次执行时间；Once 规则没有下一次
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            ScheduleRule::Once => None,
            ScheduleRule::Recurring { schedule, timezone } => schedule
                .after(&after.with_timezone(timezone))
                .next()
                .map(|t| t.with_timezone(&Utc)),
        }
    }

    pub fn is_once(&self) -> bool {
        matches!(self, ScheduleRule::Once)
    }
}

/// 解析 "HH:MM"，缺省 02:00；格式非法在注册时即报错
fn parse_time(time: Option<&str>) -> Result<(u32, u32)> {
    let raw = match time {
        Some(t) if !t.trim().is_empty() => t.trim(),
        _ => DEFAULT_TIME,
    };

    let parsed = NaiveTime::parse_from_str(raw, "%H:%M")
        .map_err(|_| MbmError::schedule(format!("无效的时间格式: {raw}")))?;
    Ok((parsed.hour(), parsed.minute()))
}

/// 把常见的 5 字段 Unix cron 表达式转成 cron crate 需要的 7 字段格式
/// （秒 分 时 日 月 周 年）。6 字段以上原样使用。
fn convert_cron_expression(expression: &str) -> String {
    let field_count = expression.split_whitespace().count();
    if field_count == 5 {
        format!("0 {expression} *")
    } else {
        expression.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn config(json: &str) -> ScheduleConfig {
        ScheduleConfig::parse_json(json).unwrap()
    }

    #[test]
    fn test_daily_added_mid_morning_fires_next_day() {
        let rule =
            ScheduleRule::parse(ScheduleType::Daily, &config(r#"{"time":"02:00"}"#)).unwrap();

        // D 日 10:00 注册 -> 下一次是 D+1 日 02:00
        let after = Utc.with_ymd_and_hms(2026, 3, 10, 10, 0, 0).unwrap();
        let next = rule.next_after(after).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 3, 11, 2, 0, 0).unwrap());

        // 注册在 02:00 之前则当天触发
        let after = Utc.with_ymd_and_hms(2026, 3, 10, 1, 0, 0).unwrap();
        let next = rule.next_after(after).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 3, 10, 2, 0, 0).unwrap());
    }

    #[test]
    fn test_daily_time_defaults_to_two_am() {
        let rule = ScheduleRule::parse(ScheduleType::Daily, &config("{}")).unwrap();
        let after = Utc.with_ymd_and_hms(2026, 3, 10, 10, 0, 0).unwrap();
        let next = rule.next_after(after).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 3, 11, 2, 0, 0).unwrap());
    }

    #[test]
    fn test_weekly_fires_on_given_weekday() {
        // weekday 3 = 周三；2026-03-10 是周二
        let rule = ScheduleRule::parse(
            ScheduleType::Weekly,
            &config(r#"{"weekday":3,"time":"08:30"}"#),
        )
        .unwrap();
        let after = Utc.with_ymd_and_hms(2026, 3, 10, 12, 0, 0).unwrap();
        let next = rule.next_after(after).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 3, 11, 8, 30, 0).unwrap());
    }

    #[test]
    fn test_monthly_fires_on_given_day() {
        let rule = ScheduleRule::parse(
            ScheduleType::Monthly,
            &config(r#"{"day":15,"time":"02:00"}"#),
        )
        .unwrap();
        let after = Utc.with_ymd_and_hms(2026, 3, 20, 0, 0, 0).unwrap();
        let next = rule.next_after(after).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 4, 15, 2, 0, 0).unwrap());
    }

    #[test]
    fn test_cron_five_field_expression() {
        let rule = ScheduleRule::parse(
            ScheduleType::Cron,
            &config(r#"{"expression":"*/15 * * * *"}"#),
        )
        .unwrap();
        let after = Utc.with_ymd_and_hms(2026, 3, 10, 10, 32, 0).unwrap();
        let next = rule.next_after(after).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 3, 10, 10, 45, 0).unwrap());
    }

    #[test]
    fn test_timezone_applied() {
        let rule = ScheduleRule::parse(
            ScheduleType::Daily,
            &config(r#"{"time":"02:00","timezone":"Asia/Shanghai"}"#),
        )
        .unwrap();
        // 东八区 02:00 = UTC 前一天 18:00
        let after = Utc.with_ymd_and_hms(2026, 3, 10, 10, 0, 0).unwrap();
        let next = rule.next_after(after).unwrap();
        assert_eq!(next, Utc.with_ymd_and_hms(2026, 3, 10, 18, 0, 0).unwrap());
    }

    #[test]
    fn test_once_has_no_next_run() {
        let rule = ScheduleRule::parse(ScheduleType::Once, &config("{}")).unwrap();
        assert!(rule.is_once());
        assert!(rule.next_after(Utc::now()).is_none());
    }

    #[test]
    fn test_validation_errors_raised_at_parse_time() {
        // 非法时间
        assert!(
            ScheduleRule::parse(ScheduleType::Daily, &config(r#"{"time":"25:99"}"#)).is_err()
        );
        // 非法星期
        assert!(
            ScheduleRule::parse(ScheduleType::Weekly, &config(r#"{"weekday":9}"#)).is_err()
        );
        // monthly 缺少 day、day 越界
        assert!(ScheduleRule::parse(ScheduleType::Monthly, &config("{}")).is_err());
        assert!(
            ScheduleRule::parse(ScheduleType::Monthly, &config(r#"{"day":32}"#)).is_err()
        );
        // cron 缺少或非法表达式
        assert!(ScheduleRule::parse(ScheduleType::Cron, &config("{}")).is_err());
        assert!(
            ScheduleRule::parse(
                ScheduleType::Cron,
                &config(r#"{"expression":"not a cron"}"#)
            )
            .is_err()
        );
        // 非法时区
        assert!(
            ScheduleRule::parse(
                ScheduleType::Daily,
                &config(r#"{"timezone":"Mars/Olympus"}"#)
            )
            .is_err()
        );
        // 配置不是合法 JSON
        assert!(ScheduleConfig::parse_json("not json").is_err());
    }
}
