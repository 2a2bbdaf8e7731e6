//! Classification of extractor output lines.
//!
//! The extractor writes newline-delimited progress to its stdout, e.g.
//!
//! ```text
//! [download]  45.2% of ~  85.48MiB at  831.64KiB/s ETA 01:01 (frag 101/247)
//! [download] Destination: /downloads/Videos/Clip.mp4
//! [download] /downloads/Videos/Clip.mp4 has already been downloaded
//! ```
//!
//! Units are honored literally: `KiB/MiB/GiB` are powers of 1024, `KB/MB/GB`
//! powers of 1000. Mixing them up would truncate `total_bytes` by up to 2.4%.

use once_cell::sync::Lazy;
use regex::Regex;

use grabbit_core::ProgressPatch;

static PROGRESS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"\[download\]\s+(?P<percent>\d+\.?\d*)%\s+of\s+~?\s*(?P<total>\d+\.?\d*)\s*(?P<total_unit>Ki?B|Mi?B|Gi?B)\s+at\s+(?P<speed>\d+\.?\d*)\s*(?P<speed_unit>Ki?B|Mi?B|Gi?B)/s\s+ETA\s+(?P<eta>\d+:\d+(?::\d+)?)",
    )
    .expect("valid progress regex")
});

static DESTINATION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"Destination:\s+(?P<path>.+)").expect("valid destination regex"));

/// What one output line means to the worker.
#[derive(Clone, Debug, PartialEq)]
pub enum LineEvent {
    /// A parsed progress sample.
    Progress(ProgressPatch),
    /// The extractor announced its output path.
    Destination(String),
    /// The artifact is already fully present on disk.
    AlreadyDownloaded,
    /// Nothing the worker acts on.
    Noise,
}

/// Classify one line of extractor output.
#[must_use]
pub fn classify_line(line: &str) -> LineEvent {
    if line.contains("has already been downloaded") {
        return LineEvent::AlreadyDownloaded;
    }

    if let Some(caps) = DESTINATION_RE.captures(line) {
        let path = caps["path"].trim();
        let basename = std::path::Path::new(path)
            .file_name()
            .map_or(path, |n| n.to_str().unwrap_or(path));
        return LineEvent::Destination(basename.to_string());
    }

    if let Some(caps) = PROGRESS_RE.captures(line) {
        let percent: f64 = caps["percent"].parse().unwrap_or(0.0);
        let total_value: f64 = caps["total"].parse().unwrap_or(0.0);
        let speed_value: f64 = caps["speed"].parse().unwrap_or(0.0);

        let total_bytes = to_bytes(total_value, &caps["total_unit"]);
        #[allow(clippy::cast_precision_loss)]
        let speed_bytes = to_bytes(speed_value, &caps["speed_unit"]) as f64;
        #[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let downloaded_bytes = (total_bytes as f64 * percent / 100.0) as u64;

        return LineEvent::Progress(ProgressPatch {
            progress: (percent * 10.0).round() / 10.0,
            downloaded_bytes,
            total_bytes,
            speed: (speed_bytes / 1024.0 * 10.0).round() / 10.0,
            pending_time: parse_eta(&caps["eta"]),
        });
    }

    LineEvent::Noise
}

/// Convert a value with a literal unit token into bytes.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn to_bytes(value: f64, unit: &str) -> u64 {
    let multiplier: f64 = match unit {
        "KiB" => 1024.0,
        "MiB" => 1024.0 * 1024.0,
        "GiB" => 1024.0 * 1024.0 * 1024.0,
        "KB" => 1000.0,
        "MB" => 1000.0 * 1000.0,
        "GB" => 1000.0 * 1000.0 * 1000.0,
        _ => 1.0,
    };
    (value * multiplier) as u64
}

/// Parse `MM:SS` or `H:MM:SS` into seconds.
fn parse_eta(eta: &str) -> Option<f64> {
    let parts: Vec<&str> = eta.split(':').collect();
    let mut seconds: u64 = 0;
    for part in &parts {
        seconds = seconds.checked_mul(60)?.checked_add(part.parse().ok()?)?;
    }
    #[allow(clippy::cast_precision_loss)]
    Some(seconds as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_standard_progress_line() {
        let line = "[download]  45.2% of 150.00MiB at  2.50MiB/s ETA 00:35";
        let LineEvent::Progress(p) = classify_line(line) else {
            panic!("expected progress");
        };
        assert!((p.progress - 45.2).abs() < f64::EPSILON);
        assert_eq!(p.total_bytes, 157_286_400);
        assert_eq!(p.downloaded_bytes, 71_093_452);
        assert!((p.speed - 2560.0).abs() < f64::EPSILON);
        assert_eq!(p.pending_time, Some(35.0));
    }

    #[test]
    fn parses_approximate_sizes_and_fragment_suffixes() {
        let line = "[download]  45.2% of ~  85.48MiB at  831.64KiB/s ETA 01:01 (frag 101/247)";
        let LineEvent::Progress(p) = classify_line(line) else {
            panic!("expected progress");
        };
        assert_eq!(p.total_bytes, 89_632_276);
        assert_eq!(p.pending_time, Some(61.0));
    }

    #[test]
    fn honors_units_literally() {
        let kib = "[download]  10.0% of 100.00KiB at  1.00KiB/s ETA 00:05";
        let kb = "[download]  10.0% of 100.00KB at  1.00KB/s ETA 00:05";
        let LineEvent::Progress(a) = classify_line(kib) else { panic!() };
        let LineEvent::Progress(b) = classify_line(kb) else { panic!() };
        assert_eq!(a.total_bytes, 102_400);
        assert_eq!(b.total_bytes, 100_000);
        assert!((a.speed - 1.0).abs() < f64::EPSILON);
        // 1000 bytes/s is slightly less than one KiB/s
        assert!((b.speed - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn parses_hour_long_etas() {
        let line = "[download]   1.0% of 4.00GiB at  1.00MiB/s ETA 1:08:15";
        let LineEvent::Progress(p) = classify_line(line) else {
            panic!("expected progress");
        };
        assert_eq!(p.pending_time, Some(4095.0));
        assert_eq!(p.total_bytes, 4_294_967_296);
    }

    #[test]
    fn destination_line_yields_basename() {
        let line = "[download] Destination: /downloads/Videos/Clip-720p.mp4";
        assert_eq!(
            classify_line(line),
            LineEvent::Destination("Clip-720p.mp4".to_string())
        );
    }

    #[test]
    fn already_downloaded_wins_over_everything() {
        let line = "[download] /downloads/Videos/Clip.mp4 has already been downloaded";
        assert_eq!(classify_line(line), LineEvent::AlreadyDownloaded);
    }

    #[test]
    fn merge_and_noise_lines_are_ignored() {
        assert_eq!(classify_line("[Merger] Merging formats into output.mkv"), LineEvent::Noise);
        assert_eq!(classify_line(""), LineEvent::Noise);
        assert_eq!(classify_line("[youtube] abc: Downloading webpage"), LineEvent::Noise);
    }
}
