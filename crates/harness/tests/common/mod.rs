//! Shared rig for integration tests
//!
//! Builds a throwaway tree with `sh` scripts standing in for the controller,
//! its supervisor and the emulator's backdoor tool. Control points are plain
//! files in `points/`, read through [`FilePointClient`].

#![allow(dead_code)]

use hilt_common::config::{BackdoorConfig, ControllerConfig, EmulatorConfig};
use hilt_common::{ControlPointClient, Error, HarnessConfig, Result, SimulationMode, Value};
use hilt_harness::{ControllerLauncher, EmulatorLauncher, HarnessContext};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Fake controller: publishes points, mirrors link state into `:STATUS`,
/// echoes anything dropped into `$STATE/say`, and exits on `exit`.
const CONTROLLER: &str = r#"
macro() { sed -n "s/^$1 = \"\(.*\)\"$/\1/p" "$HILT_MACRO_FILE"; }
NAME=$(macro DEVICE)
POINTS=$(macro POINTS_DIR)
STATE=$(macro STATE_DIR)
MARKER=$(macro MARKER)

[ -f "$1" ] || { echo "boot script $1 not found"; exit 1; }

echo "$HILT_SIMULATION_MODE" > "$POINTS/$NAME:MODE"
echo "${HILT_EMULATOR_PORT:-none}" > "$POINTS/$NAME:PORT"
echo $$ > "$POINTS/$NAME:PID"
echo 0 > "$POINTS/$NAME:DISABLE"
echo "iocInit: ${MARKER:-All initialization complete}"

(
  while [ -f "$POINTS/$NAME:DISABLE" ]; do
    if [ -f "$STATE/link_down" ]; then s=INVALID; else s=OK; fi
    echo $s > "$POINTS/$NAME:STATUS.tmp" && mv "$POINTS/$NAME:STATUS.tmp" "$POINTS/$NAME:STATUS"
    if [ -f "$STATE/say" ]; then cat "$STATE/say"; rm -f "$STATE/say"; fi
    sleep 0.05
  done
) &

while read -r line; do
  case "$line" in
    exit) rm -f "$POINTS/$NAME:DISABLE" "$POINTS/$NAME:MODE" "$POINTS/$NAME:PORT"; exit 0 ;;
    *) echo "$line" ;;
  esac
done

while true; do sleep 1; done
"#;

/// Fake supervisor: `<name> <port> <command...>`, restarts the command forever
const SUPERVISOR: &str = r#"
NAME="$1"; PORT="$2"; shift 2
echo "supervising $NAME on $PORT"
while true; do
  "$@" < /dev/null
  echo "@@@ $NAME exited, restarting"
  sleep 0.1
done
"#;

/// Fake backdoor tool: `<state dir> <target> <member> [values...]`
const BACKDOOR: &str = r#"
STATE="$1"; TARGET="$2"; MEMBER="$3"; shift 3
case "$TARGET:$MEMBER" in
  simulation:disconnect_device) touch "$STATE/link_down" ;;
  simulation:connect_device) rm -f "$STATE/link_down" ;;
  device:*)
    if [ $# -gt 0 ]; then
      printf '%s' "$1" > "$STATE/prop_$MEMBER"
    elif [ -f "$STATE/prop_$MEMBER" ]; then
      cat "$STATE/prop_$MEMBER"; echo
    else
      echo "no attribute $MEMBER" >&2; exit 2
    fi ;;
  *) echo "unknown target $TARGET" >&2; exit 3 ;;
esac
"#;

/// Control points backed by one file per point
pub struct FilePointClient {
    dir: PathBuf,
}

impl FilePointClient {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl ControlPointClient for FilePointClient {
    fn get(&self, name: &str) -> Result<String> {
        match fs::read_to_string(self.dir.join(name)) {
            Ok(text) => Ok(text.trim().to_string()),
            Err(_) => Err(Error::SourceUnavailable(format!("{} does not resolve", name))),
        }
    }

    fn set(&self, name: &str, value: &Value) -> Result<()> {
        fs::write(self.dir.join(name), value.to_string())?;
        Ok(())
    }
}

pub struct Rig {
    pub root: TempDir,
    pub points: PathBuf,
    pub state: PathBuf,
    pub client: Arc<FilePointClient>,
}

impl Rig {
    pub fn new() -> Self {
        let root = TempDir::new().unwrap();
        let points = root.path().join("points");
        let state = root.path().join("state");
        fs::create_dir_all(&points).unwrap();
        fs::create_dir_all(&state).unwrap();
        fs::write(root.path().join("controller.sh"), CONTROLLER).unwrap();
        fs::write(root.path().join("supervisor.sh"), SUPERVISOR).unwrap();
        fs::write(root.path().join("backdoor.sh"), BACKDOOR).unwrap();

        let client = Arc::new(FilePointClient::new(&points));
        Self {
            root,
            points,
            state,
            client,
        }
    }

    fn script(&self, name: &str) -> String {
        self.root.path().join(name).display().to_string()
    }

    pub fn config(&self) -> HarnessConfig {
        let mut config = HarnessConfig {
            log_dir: self.root.path().join("logs"),
            ..Default::default()
        };
        config.assertions.default_timeout_ms = 3_000;
        config.assertions.poll_interval_ms = 50;
        config.controller = self.controller_config();
        config.emulator = self.emulator_config();
        config
    }

    pub fn context(&self) -> HarnessContext {
        HarnessContext::new(self.config()).unwrap()
    }

    pub fn controller_config(&self) -> ControllerConfig {
        ControllerConfig {
            program: "sh".to_string(),
            args: vec![self.script("controller.sh"), "{boot_script}".to_string()],
            startup_timeout_secs: 10,
            marker_poll_interval_ms: 50,
            stop_timeout_secs: 5,
            stop_poll_interval_ms: 50,
            supervisor_program: "sh".to_string(),
            supervisor_args: vec![
                self.script("supervisor.sh"),
                "{name}".to_string(),
                "{supervisor_port}".to_string(),
            ],
            ..Default::default()
        }
    }

    pub fn emulator_config(&self) -> EmulatorConfig {
        EmulatorConfig {
            program: "sh".to_string(),
            args: vec![
                "-c".to_string(),
                "echo \"emulating {device} on port {port}\"; exec sleep 600".to_string(),
            ],
            startup_marker: Some("emulating".to_string()),
            startup_timeout_secs: 5,
            stop_grace_ms: 200,
            backdoor: BackdoorConfig {
                program: "sh".to_string(),
                args: vec![self.script("backdoor.sh"), self.state.display().to_string()],
                completion_polls: 40,
                completion_poll_interval_ms: 50,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Create `iocBoot/<name>/st.cmd`
    pub fn boot_dir(&self, name: &str) -> PathBuf {
        let dir = self.root.path().join("iocBoot").join(name);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join("st.cmd"), "# boot\n").unwrap();
        dir
    }

    pub fn controller(&self, name: &str, mode: SimulationMode, config: ControllerConfig) -> ControllerLauncher {
        ControllerLauncher::new(name, mode, config, self.client.clone())
            .with_working_dir(self.root.path())
            .with_macro("DEVICE", name)
            .with_macro("POINTS_DIR", self.points.display().to_string())
            .with_macro("STATE_DIR", self.state.display().to_string())
    }

    pub fn emulator(&self, name: &str, device: &str) -> EmulatorLauncher {
        EmulatorLauncher::new(name, device, self.emulator_config())
    }

    /// Make the fake controller print `lines` to its output
    pub fn say(&self, lines: &[&str]) {
        let staged = self.state.join("say.tmp");
        let mut text = lines.join("\n");
        text.push('\n');
        fs::write(&staged, text).unwrap();
        fs::rename(&staged, self.state.join("say")).unwrap();
    }

    pub fn point_exists(&self, name: &str) -> bool {
        Path::new(&self.points).join(name).exists()
    }
}

pub const SHORT: Duration = Duration::from_secs(3);
