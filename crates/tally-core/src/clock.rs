use chrono::{
  DateTime,
  Local,
  Utc
};
use chrono_tz::Tz;

use crate::config::Config;

const TIMEZONE_ENV_VAR: &str =
  "TALLY_TIMEZONE";

/// Mirrors the browser's en-US
/// `toLocaleString` output, e.g.
/// `10/19/2026, 9:15:00 AM`.
pub const DEFAULT_TIMESTAMP_PATTERN:
  &str = "%-m/%-d/%Y, %-I:%M:%S %p";

pub trait Clock {
  fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
  fn now(&self) -> DateTime<Utc> {
    Utc::now()
  }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedClock(
  pub DateTime<Utc>
);

impl Clock for FixedClock {
  fn now(&self) -> DateTime<Utc> {
    self.0
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayZone {
  Local,
  Named(Tz)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimestampFormat {
  pub zone:    DisplayZone,
  pub pattern: String
}

impl Default for TimestampFormat {
  fn default() -> Self {
    Self {
      zone:    DisplayZone::Local,
      pattern:
        DEFAULT_TIMESTAMP_PATTERN
          .to_string()
    }
  }
}

impl TimestampFormat {
  #[tracing::instrument(skip(cfg))]
  pub fn from_config(
    cfg: &Config
  ) -> Self {
    let env_zone =
      std::env::var(TIMEZONE_ENV_VAR)
        .ok();
    let zone = resolve_zone(
      env_zone.as_deref(),
      cfg.get("timezone").as_deref()
    );

    let pattern = cfg
      .get("date.format")
      .filter(|p| !p.trim().is_empty())
      .unwrap_or_else(|| {
        DEFAULT_TIMESTAMP_PATTERN
          .to_string()
      });

    Self { zone, pattern }
  }

  #[must_use]
  pub fn render(
    &self,
    at: DateTime<Utc>
  ) -> String {
    match self.zone {
      | DisplayZone::Local => at
        .with_timezone(&Local)
        .format(&self.pattern)
        .to_string(),
      | DisplayZone::Named(tz) => at
        .with_timezone(&tz)
        .format(&self.pattern)
        .to_string()
    }
  }
}

fn resolve_zone(
  env_value: Option<&str>,
  cfg_value: Option<&str>
) -> DisplayZone {
  for (source, raw) in [
    (TIMEZONE_ENV_VAR, env_value),
    ("rc.timezone", cfg_value)
  ] {
    let Some(raw) = raw else {
      continue;
    };
    let trimmed = raw.trim();
    if trimmed.is_empty()
      || trimmed
        .eq_ignore_ascii_case("local")
    {
      continue;
    }

    match trimmed.parse::<Tz>() {
      | Ok(tz) => {
        tracing::debug!(
          source,
          timezone = %trimmed,
          "resolved display timezone"
        );
        return DisplayZone::Named(tz);
      }
      | Err(err) => {
        tracing::warn!(
          source,
          timezone = %trimmed,
          error = %err,
          "invalid timezone; ignoring"
        );
      }
    }
  }

  DisplayZone::Local
}

#[cfg(test)]
mod tests {
  use chrono::{
    TimeZone,
    Utc
  };

  use super::{
    DisplayZone,
    TimestampFormat,
    resolve_zone
  };

  #[test]
  fn renders_locale_style_timestamp()
  {
    let at = Utc
      .with_ymd_and_hms(
        2026, 10, 19, 16, 5, 9
      )
      .unwrap();
    let format = TimestampFormat {
      zone: DisplayZone::Named(
        chrono_tz::UTC
      ),
      ..TimestampFormat::default()
    };

    assert_eq!(
      format.render(at),
      "10/19/2026, 4:05:09 PM"
    );
  }

  #[test]
  fn named_zone_shifts_wall_clock() {
    let at = Utc
      .with_ymd_and_hms(
        2026, 1, 2, 3, 0, 0
      )
      .unwrap();
    let format = TimestampFormat {
      zone:    DisplayZone::Named(
        chrono_tz::America::New_York
      ),
      pattern: "%Y-%m-%d %H:%M"
        .to_string()
    };

    assert_eq!(
      format.render(at),
      "2026-01-01 22:00"
    );
  }

  #[test]
  fn env_zone_wins_and_bad_names_fall_through()
   {
    assert_eq!(
      resolve_zone(
        Some("Europe/Paris"),
        Some("Asia/Tokyo")
      ),
      DisplayZone::Named(
        chrono_tz::Europe::Paris
      )
    );
    assert_eq!(
      resolve_zone(
        Some("Not/AZone"),
        Some("Asia/Tokyo")
      ),
      DisplayZone::Named(
        chrono_tz::Asia::Tokyo
      )
    );
    assert_eq!(
      resolve_zone(None, Some("local")),
      DisplayZone::Local
    );
  }
}
