use std::fs;
use std::path::{
  Path,
  PathBuf
};

use chrono::{
  DateTime,
  Utc
};
use chrono_tz::Tz;
use serde::Deserialize;

const TIMEZONE_CONFIG_FILE: &str =
  "homedash-time.toml";
const TIMEZONE_ENV_VAR: &str =
  "HOMEDASH_TIMEZONE";
const TIMEZONE_CONFIG_ENV_VAR: &str =
  "HOMEDASH_TIME_CONFIG";

#[derive(Debug, Deserialize)]
struct TimezoneConfig {
  timezone: Option<String>,
  weather:  Option<TimezoneSection>
}

#[derive(Debug, Deserialize)]
struct TimezoneSection {
  timezone: Option<String>
}

/// Milliseconds since the Unix epoch.
#[must_use]
pub fn now_millis() -> i64 {
  Utc::now().timestamp_millis()
}

#[must_use]
pub fn from_millis(
  millis: i64
) -> Option<DateTime<Utc>> {
  DateTime::from_timestamp_millis(
    millis
  )
}

/// Timezone for rendering times. The
/// environment wins, then the rc value,
/// then the toml file, then UTC.
pub fn resolve_display_timezone(
  configured: Option<&str>
) -> Tz {
  if let Ok(raw) =
    std::env::var(TIMEZONE_ENV_VAR)
    && let Some(tz) = parse_timezone(
      &raw,
      TIMEZONE_ENV_VAR
    )
  {
    return tz;
  }

  if let Some(raw) = configured
    && let Some(tz) =
      parse_timezone(raw, "rc")
  {
    return tz;
  }

  if let Some(path) =
    timezone_config_path()
    && let Some(tz) =
      load_timezone_from_file(&path)
  {
    return tz;
  }

  chrono_tz::UTC
}

fn timezone_config_path()
-> Option<PathBuf> {
  if let Ok(raw) = std::env::var(
    TIMEZONE_CONFIG_ENV_VAR
  ) {
    let trimmed = raw.trim();
    if !trimmed.is_empty() {
      return Some(PathBuf::from(
        trimmed
      ));
    }
  }

  std::env::current_dir().ok().map(
    |dir| {
      dir.join(TIMEZONE_CONFIG_FILE)
    }
  )
}

fn load_timezone_from_file(
  path: &Path
) -> Option<Tz> {
  if !path.exists() {
    tracing::debug!(
      file = %path.display(),
      "timezone config file not found"
    );
    return None;
  }

  let raw = match fs::read_to_string(
    path
  ) {
    | Ok(raw) => raw,
    | Err(err) => {
      tracing::error!(
        file = %path.display(),
        error = %err,
        "failed reading timezone config file"
      );
      return None;
    }
  };

  let parsed = match toml::from_str::<
    TimezoneConfig
  >(&raw)
  {
    | Ok(parsed) => parsed,
    | Err(err) => {
      tracing::error!(
        file = %path.display(),
        error = %err,
        "failed parsing timezone config file"
      );
      return None;
    }
  };

  let timezone =
    parsed.timezone.or_else(|| {
      parsed.weather.and_then(
        |section| section.timezone
      )
    });
  let Some(timezone) = timezone else {
    tracing::warn!(
      file = %path.display(),
      "timezone config had no timezone field"
    );
    return None;
  };

  parse_timezone(
    timezone.as_str(),
    &format!("file:{}", path.display())
  )
}

fn parse_timezone(
  raw: &str,
  source: &str
) -> Option<Tz> {
  let trimmed = raw.trim();
  if trimmed.is_empty() {
    tracing::warn!(
      source,
      "timezone source was empty"
    );
    return None;
  }

  match trimmed.parse::<Tz>() {
    | Ok(tz) => {
      tracing::debug!(
        source,
        timezone = %trimmed,
        "configured display timezone"
      );
      Some(tz)
    }
    | Err(err) => {
      tracing::error!(
        source,
        timezone = %trimmed,
        error = %err,
        "failed to parse timezone id"
      );
      None
    }
  }
}

#[cfg(test)]
mod tests {
  use std::io::Write;

  use super::{
    from_millis,
    load_timezone_from_file,
    parse_timezone
  };

  #[test]
  fn parses_iana_names() {
    assert_eq!(
      parse_timezone(
        " Europe/Berlin ",
        "test"
      ),
      Some(chrono_tz::Europe::Berlin)
    );
    assert_eq!(
      parse_timezone("Mars/Base", "test"),
      None
    );
    assert_eq!(
      parse_timezone("  ", "test"),
      None
    );
  }

  #[test]
  fn reads_weather_section_from_toml() {
    let mut file =
      tempfile::NamedTempFile::new()
        .expect("temp file");
    writeln!(
      file,
      "[weather]\ntimezone = \"Asia/Tokyo\""
    )
    .expect("write toml");

    assert_eq!(
      load_timezone_from_file(
        file.path()
      ),
      Some(chrono_tz::Asia::Tokyo)
    );
  }

  #[test]
  fn converts_epoch_millis() {
    let dt = from_millis(0)
      .expect("epoch is valid");
    assert_eq!(
      dt.format("%Y-%m-%d").to_string(),
      "1970-01-01"
    );
  }
}
