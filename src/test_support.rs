use std::{
  os::unix::fs::PermissionsExt,
  path::{Path, PathBuf},
};

// Parses `-o` out of the arguments, logs the call next to the script and
// defines `emit`, which writes the video and prints yt-dlp's JSON.
const YTDLP_PRELUDE: &str = r#"
out=""
prev=""
for arg in "$@"; do
  if [ "$prev" = "-o" ]; then out="$arg"; fi
  prev="$arg"
done
echo "$*" >> "$(dirname "$0")/calls.log"

emit() {
  file=$(printf '%s' "$out" | sed -e 's/%(title)s/clip/' -e 's/%(ext)s/mp4/')
  printf 'video' > "$file"
  printf '{"title": "clip", "_filename": "%s"}\n' "$file"
}
"#;

/// Writes an executable shell script into `dir`.
pub fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
  let path = dir.join(name);
  std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
  let mut perms = std::fs::metadata(&path).unwrap().permissions();
  perms.set_mode(0o755);
  std::fs::set_permissions(&path, perms).unwrap();
  path
}

/// A stand-in yt-dlp; `body` runs after the prelude and may call `emit`.
pub fn fake_ytdlp(dir: &Path, body: &str) -> String {
  let path = script(dir, "yt-dlp", &format!("{YTDLP_PRELUDE}\n{body}"));
  path.to_string_lossy().into_owned()
}

/// Argument lines of every fake yt-dlp run in `dir`.
pub fn ytdlp_calls(dir: &Path) -> Vec<String> {
  std::fs::read_to_string(dir.join("calls.log"))
    .map(|log| log.lines().map(String::from).collect())
    .unwrap_or_default()
}
