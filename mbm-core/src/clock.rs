use chrono::{DateTime, Utc};

/// 时钟抽象，调度引擎据此计算下次执行时间，测试中可注入固定时钟
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// 系统时钟
#[derive(Debug, Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::FixedClock;
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_fixed_clock_is_settable() {
        let t0 = Utc.with_ymd_and_hms(2026, 3, 10, 2, 0, 0).unwrap();
        let clock = FixedClock::new(t0);
        assert_eq!(clock.now(), t0);

        let t1 = t0 + chrono::Duration::hours(1);
        clock.set(t1);
        assert_eq!(clock.now(), t1);
    }
}
