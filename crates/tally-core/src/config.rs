use std::collections::BTreeMap;
use std::fs;
use std::path::{
  Path,
  PathBuf
};

use anyhow::{
  Context,
  anyhow
};
use tracing::{
  debug,
  info,
  trace,
  warn
};

const RC_ENV_VAR: &str = "TALLYRC";
const RC_FILE_NAME: &str = ".tallyrc";

/// Flat `key = value` settings.
///
/// Later sources win: built-in
/// defaults, then the rc file (with
/// its includes), then overrides.
#[derive(Debug, Clone)]
pub struct Config {
  map:              BTreeMap<String, String>,
  pub loaded_files: Vec<PathBuf>
}

impl Default for Config {
  fn default() -> Self {
    let map = [
      ("data.location", "~/.tally"),
      ("default.command", "list"),
      ("color", "on"),
      ("theme.ambient", "auto")
    ]
    .into_iter()
    .map(|(k, v)| {
      (k.to_string(), v.to_string())
    })
    .collect();

    Self {
      map,
      loaded_files: vec![]
    }
  }
}

impl Config {
  #[tracing::instrument(skip(
    rc_override
  ))]
  pub fn load(
    rc_override: Option<&Path>
  ) -> anyhow::Result<Self> {
    let mut cfg = Config::default();

    match resolve_rc_path(rc_override)?
    {
      | Some(path) => {
        info!(rc = %path.display(), "loading rc file");
        cfg.load_file(&path)?;
      }
      | None => {
        debug!(
          "no rc file found; using \
           defaults"
        );
      }
    }

    Ok(cfg)
  }

  #[tracing::instrument(skip(
    self, overrides
  ))]
  pub fn apply_overrides<I>(
    &mut self,
    overrides: I
  ) where
    I: IntoIterator<
      Item = (String, String)
    >
  {
    for (k, v) in overrides {
      let key = k
        .strip_prefix("rc.")
        .unwrap_or(&k)
        .to_string();
      debug!(key = %key, value = %v, "applying override");
      self.map.insert(key, v);
    }
  }

  pub fn set(
    &mut self,
    key: &str,
    value: &str
  ) {
    self.map.insert(
      key.to_string(),
      value.to_string()
    );
  }

  pub fn get(
    &self,
    key: &str
  ) -> Option<String> {
    self.map.get(key).cloned()
  }

  /// `None` when the key is missing
  /// or not a recognisable switch.
  pub fn get_bool(
    &self,
    key: &str
  ) -> Option<bool> {
    self
      .map
      .get(key)
      .and_then(|v| parse_bool(v))
  }

  pub fn iter(
    &self
  ) -> impl Iterator<Item = (&String, &String)>
  {
    self.map.iter()
  }

  #[tracing::instrument(skip(self))]
  fn load_file(
    &mut self,
    path: &Path
  ) -> anyhow::Result<()> {
    let path = expand_tilde(path);
    let text =
      fs::read_to_string(&path)
        .with_context(|| {
          format!(
            "failed to read {}",
            path.display()
          )
        })?;
    self.parse_text(&text, &path)
  }

  fn parse_text(
    &mut self,
    text: &str,
    path: &Path
  ) -> anyhow::Result<()> {
    // Canonical paths, so `../conf/main.rc` matches `main.rc`.
    let key = fs::canonicalize(path)
      .unwrap_or_else(|_| {
        path.to_path_buf()
      });
    if self
      .loaded_files
      .iter()
      .any(|seen| *seen == key)
    {
      warn!(file = %path.display(), "rc file included twice; skipping");
      return Ok(());
    }
    self.loaded_files.push(key);

    let base_dir = path
      .parent()
      .map(Path::to_path_buf)
      .unwrap_or_else(|| {
        PathBuf::from(".")
      });

    for (line_num, raw_line) in
      text.lines().enumerate()
    {
      let line = raw_line
        .split_once('#')
        .map_or(raw_line, |(before, _)| {
          before
        })
        .trim();
      if line.is_empty() {
        continue;
      }

      if let Some(include_rest) =
        line.strip_prefix("include ")
      {
        let include_path =
          resolve_include_path(
            &base_dir,
            include_rest.trim()
          )?;
        debug!(
          file = %path.display(),
          include = %include_path.display(),
          line = line_num + 1,
          "processing include"
        );

        if include_path.exists() {
          self
            .load_file(&include_path)?;
        } else {
          warn!(include = %include_path.display(), "include file does not exist; skipping");
        }
        continue;
      }

      let (k, v) = line
        .split_once('=')
        .ok_or_else(|| {
          anyhow!(
            "invalid config line \
             {}:{}: {}",
            path.display(),
            line_num + 1,
            raw_line
          )
        })?;

      let key = k.trim();
      if key.is_empty() {
        return Err(anyhow!(
          "empty config key at {}:{}",
          path.display(),
          line_num + 1
        ));
      }

      trace!(key = %key, value = %v.trim(), "loaded config key");
      self.set(key, v.trim());
    }

    Ok(())
  }
}

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
    | None => match cfg
      .get("data.location")
    {
      | Some(value)
        if !value.trim().is_empty() =>
      {
        expand_tilde(Path::new(
          value.trim()
        ))
      }
      | _ => home_dir()?.join(".tally")
    }
  };

  if !dir.exists() {
    info!(dir = %dir.display(), "creating data directory");
    fs::create_dir_all(&dir)
      .with_context(|| {
        format!(
          "failed to create {}",
          dir.display()
        )
      })?;
  }

  Ok(dir)
}

fn resolve_rc_path(
  override_path: Option<&Path>
) -> anyhow::Result<Option<PathBuf>> {
  if let Some(path) = override_path {
    return Ok(Some(path.to_path_buf()));
  }

  if let Ok(rc_env) =
    std::env::var(RC_ENV_VAR)
  {
    if rc_env == "/dev/null" {
      return Ok(None);
    }
    return Ok(Some(PathBuf::from(
      rc_env
    )));
  }

  let Some(home) = dirs::home_dir()
  else {
    warn!(
      "cannot determine home \
       directory; skipping rc file"
    );
    return Ok(None);
  };
  let candidate =
    home.join(RC_FILE_NAME);
  Ok(candidate
    .exists()
    .then_some(candidate))
}

fn home_dir() -> anyhow::Result<PathBuf>
{
  dirs::home_dir().ok_or_else(|| {
    anyhow!(
      "cannot determine home directory"
    )
  })
}

fn resolve_include_path(
  base_dir: &Path,
  include: &str
) -> anyhow::Result<PathBuf> {
  if include.is_empty() {
    return Err(anyhow!(
      "include path cannot be empty"
    ));
  }

  let expanded =
    expand_tilde(Path::new(include));
  if expanded.is_absolute() {
    Ok(expanded)
  } else {
    Ok(base_dir.join(expanded))
  }
}

fn expand_tilde(
  path: &Path
) -> PathBuf {
  let text = path.to_string_lossy();
  if let Some(rest) =
    text.strip_prefix("~/")
    && let Some(home) = dirs::home_dir()
  {
    return home.join(rest);
  }
  path.to_path_buf()
}

fn parse_bool(s: &str) -> Option<bool> {
  match s
    .trim()
    .to_ascii_lowercase()
    .as_str()
  {
    | "1" | "y" | "yes" | "on"
    | "true" => Some(true),
    | "0" | "n" | "no" | "off"
    | "false" => Some(false),
    | _ => None
  }
}
