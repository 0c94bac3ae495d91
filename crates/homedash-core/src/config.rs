use std::collections::HashMap;
use std::fs;
use std::path::{
  Path,
  PathBuf
};
use std::str::FromStr;

use anyhow::{
  Context,
  anyhow,
  bail
};
use tracing::{
  debug,
  info,
  trace,
  warn
};

const RC_ENV_VAR: &str = "HOMEDASHRC";
const RC_FILE_NAME: &str = ".homedashrc";
const DATA_DIR_NAME: &str = ".homedash";

pub const KEY_DATA_LOCATION: &str =
  "data.location";
pub const KEY_COLOR: &str = "color";
pub const KEY_WEATHER_TIMEZONE: &str =
  "weather.timezone";

const DEFAULTS: [(&str, &str); 2] = [
  (KEY_DATA_LOCATION, "~/.homedash"),
  (KEY_COLOR, "on")
];

/// Front-end settings: built-in
/// defaults, then the rc file and its
/// includes, then command-line
/// overrides.
#[derive(Debug, Clone, Default)]
pub struct Config {
  values:  HashMap<String, String>,
  sources: Vec<PathBuf>
}

impl Config {
  #[tracing::instrument(skip(
    rc_override
  ))]
  pub fn load(
    rc_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut cfg = Self::defaults();

    match locate_rc_file(rc_override)? {
      | Some(path) => {
        info!(rc = %path.display(), "reading rc file");
        cfg.read_rc(
          &path,
          &mut Vec::new()
        )?;
      }
      | None => {
        debug!("no rc file; using defaults")
      }
    }

    Ok(cfg)
  }

  pub fn defaults() -> Self {
    Self {
      values:  DEFAULTS
        .iter()
        .map(|(key, value)| {
          (
            (*key).to_string(),
            (*value).to_string()
          )
        })
        .collect(),
      sources: Vec::new()
    }
  }

  pub fn apply_overrides<I>(
    &mut self,
    overrides: I
  ) where
    I: IntoIterator<Item = RcOverride>
  {
    for RcOverride {
      key,
      value
    } in overrides
    {
      debug!(%key, %value, "rc override");
      self.values.insert(key, value);
    }
  }

  pub fn get(
    &self,
    key: &str
  ) -> Option<&str> {
    self
      .values
      .get(key)
      .map(String::as_str)
  }

  /// `None` when the key is unset; an
  /// error when it holds something
  /// other than an on/off spelling.
  pub fn get_bool(
    &self,
    key: &str
  ) -> anyhow::Result<Option<bool>> {
    self
      .get(key)
      .map(|raw| {
        parse_switch(raw).ok_or_else(
          || {
            anyhow!(
              "{key} must be on or \
               off, got `{raw}`"
            )
          }
        )
      })
      .transpose()
  }

  pub fn data_location(
    &self
  ) -> Option<PathBuf> {
    self
      .get(KEY_DATA_LOCATION)
      .map(str::trim)
      .filter(|raw| !raw.is_empty())
      .map(|raw| {
        expand_tilde(Path::new(raw))
      })
  }

  pub fn color(
    &self
  ) -> anyhow::Result<bool> {
    Ok(
      self
        .get_bool(KEY_COLOR)?
        .unwrap_or(true)
    )
  }

  pub fn weather_timezone(
    &self
  ) -> Option<&str> {
    self
      .get(KEY_WEATHER_TIMEZONE)
      .map(str::trim)
      .filter(|tz| !tz.is_empty())
  }

  /// Files read so far, in read
  /// order.
  pub fn sources(&self) -> &[PathBuf] {
    &self.sources
  }

  /// `chain` holds the canonical paths
  /// of the files currently being read,
  /// outermost first.
  #[tracing::instrument(skip(
    self, chain
  ))]
  fn read_rc(
    &mut self,
    path: &Path,
    chain: &mut Vec<PathBuf>
  ) -> anyhow::Result<()> {
    let path = expand_tilde(path);
    let text = fs::read_to_string(
      &path
    )
    .with_context(|| {
      format!(
        "failed to read rc file {}",
        path.display()
      )
    })?;
    let canonical =
      fs::canonicalize(&path)
        .with_context(|| {
          format!(
            "failed to resolve {}",
            path.display()
          )
        })?;

    if chain.contains(&canonical) {
      let cycle = chain
        .iter()
        .chain([&canonical])
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(" -> ");
      bail!("rc include cycle: {cycle}");
    }

    chain.push(canonical);
    self.sources.push(path.clone());
    let base_dir = path
      .parent()
      .map(Path::to_path_buf)
      .unwrap_or_default();

    for (idx, raw) in
      text.lines().enumerate()
    {
      let parsed = parse_rc_line(raw)
        .with_context(|| {
          format!(
            "{}:{}",
            path.display(),
            idx + 1
          )
        })?;

      match parsed {
        | None => {}
        | Some(RcLine::Include(
          target
        )) => {
          let target = base_dir.join(
            expand_tilde(Path::new(
              target
            ))
          );
          if target.is_file() {
            self.read_rc(
              &target, chain
            )?;
          } else {
            warn!(
              include = %target.display(),
              "included rc file missing; skipping"
            );
          }
        }
        | Some(RcLine::Setting {
          key,
          value
        }) => {
          trace!(key, value, "rc setting");
          self.values.insert(
            key.to_string(),
            value.to_string()
          );
        }
      }
    }

    chain.pop();
    Ok(())
  }
}

/// One `key=value` override from the
/// command line. A leading `rc.` on the
/// key is dropped.
#[derive(
  Debug, Clone, PartialEq, Eq,
)]
pub struct RcOverride {
  pub key:   String,
  pub value: String
}

impl RcOverride {
  fn new(
    key: &str,
    value: &str
  ) -> Option<Self> {
    let key = key.trim();
    let key = key
      .strip_prefix("rc.")
      .unwrap_or(key);
    (!key.is_empty()).then(|| Self {
      key:   key.to_string(),
      value: value.trim().to_string()
    })
  }

  /// Bare `rc.key=value` or
  /// `rc.key:value` word.
  pub fn from_positional(
    arg: &str
  ) -> Option<Self> {
    let rest =
      arg.strip_prefix("rc.")?;
    let (key, value) = rest
      .split_once('=')
      .or_else(|| rest.split_once(':'))?;
    Self::new(key, value)
  }
}

impl FromStr for RcOverride {
  type Err = anyhow::Error;

  fn from_str(
    s: &str
  ) -> Result<Self, Self::Err> {
    s.split_once('=')
      .and_then(|(key, value)| {
        Self::new(key, value)
      })
      .ok_or_else(|| {
        anyhow!(
          "expected KEY=VALUE, got \
           `{s}`"
        )
      })
  }
}

#[derive(Debug, PartialEq, Eq)]
enum RcLine<'a> {
  Include(&'a str),
  Setting {
    key:   &'a str,
    value: &'a str
  }
}

/// `None` for blank and comment-only
/// lines.
fn parse_rc_line(
  raw: &str
) -> anyhow::Result<Option<RcLine<'_>>>
{
  let line = raw
    .split_once('#')
    .map_or(raw, |(before, _)| before)
    .trim();
  if line.is_empty() {
    return Ok(None);
  }

  if let Some(target) =
    line.strip_prefix("include ")
  {
    return Ok(Some(RcLine::Include(
      target.trim()
    )));
  }

  let (key, value) = line
    .split_once('=')
    .ok_or_else(|| {
      anyhow!(
        "expected `key = value`, got \
         `{line}`"
      )
    })?;
  let key = key.trim();
  if key.is_empty() {
    bail!("missing key before `=`");
  }

  Ok(Some(RcLine::Setting {
    key,
    value: value.trim()
  }))
}

/// `HOMEDASHRC` set to an empty string
/// or `/dev/null` disables the rc file.
fn locate_rc_file(
  rc_override: Option<&Path>
) -> anyhow::Result<Option<PathBuf>> {
  if let Some(path) = rc_override {
    return Ok(Some(path.to_path_buf()));
  }

  match std::env::var_os(RC_ENV_VAR) {
    | Some(value)
      if value.is_empty()
        || value == "/dev/null" =>
    {
      Ok(None)
    }
    | Some(value) => {
      Ok(Some(PathBuf::from(value)))
    }
    | None => {
      let candidate =
        home_dir()?.join(RC_FILE_NAME);
      Ok(
        candidate
          .is_file()
          .then_some(candidate)
      )
    }
  }
}

/// `--data` wins over `data.location`;
/// the directory is created when
/// missing.
#[tracing::instrument(skip(
  cfg,
  override_dir
))]
pub fn resolve_data_dir(
  cfg: &Config,
  override_dir: Option<&Path>
) -> anyhow::Result<PathBuf> {
  let dir = match override_dir {
    | Some(path) => path.to_path_buf(),
    | None => {
      match cfg.data_location() {
        | Some(path) => path,
        | None => {
          home_dir()?.join(DATA_DIR_NAME)
        }
      }
    }
  };

  fs::create_dir_all(&dir)
    .with_context(|| {
      format!(
        "failed to create data \
         directory {}",
        dir.display()
      )
    })?;
  debug!(dir = %dir.display(), "data directory ready");
  Ok(dir)
}

fn home_dir() -> anyhow::Result<PathBuf>
{
  dirs::home_dir().context(
    "cannot determine home directory"
  )
}

fn expand_tilde(
  path: &Path
) -> PathBuf {
  match (
    path.strip_prefix("~"),
    dirs::home_dir()
  ) {
    | (Ok(rest), Some(home)) => {
      home.join(rest)
    }
    | _ => path.to_path_buf()
  }
}

fn parse_switch(
  raw: &str
) -> Option<bool> {
  match raw
    .trim()
    .to_ascii_lowercase()
    .as_str()
  {
    | "on" | "yes" | "true" | "1" => {
      Some(true)
    }
    | "off" | "no" | "false" | "0" => {
      Some(false)
    }
    | _ => None
  }
}
