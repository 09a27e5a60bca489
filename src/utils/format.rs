//! Human-readable formatting for sizes, durations and stream properties.

const KB: f64 = 1024.0;
const MB: f64 = 1024.0 * 1024.0;
const GB: f64 = 1024.0 * 1024.0 * 1024.0;

/// Format file size in human-readable format (e.g. "15.5 MB")
pub fn format_file_size(size_bytes: u64) -> String {
    let size = size_bytes as f64;
    if size < KB {
        format!("{} B", size_bytes)
    } else if size < MB {
        format!("{:.1} KB", size / KB)
    } else if size < GB {
        format!("{:.1} MB", size / MB)
    } else {
        format!("{:.1} GB", size / GB)
    }
}

/// Format a duration in seconds as MM:SS, or HH:MM:SS past the hour
pub fn format_duration(seconds: f64) -> String {
    if !(seconds > 0.0) {
        return "Unknown".to_string();
    }

    let total = seconds as u64;
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let secs = total % 60;

    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{:02}:{:02}", minutes, secs)
    }
}

/// Format bits per second as kbps / Mbps
pub fn format_bitrate(bps: u64) -> String {
    if bps == 0 {
        return "Unknown".to_string();
    }

    let kbps = bps as f64 / 1000.0;
    if kbps >= 1000.0 {
        format!("{:.1} Mbps", kbps / 1000.0)
    } else {
        format!("{:.0} kbps", kbps)
    }
}

/// Evaluate an ffprobe frame rate such as "30000/1001"
pub fn format_frame_rate(raw: &str) -> String {
    let value = match raw.split_once('/') {
        Some((num, den)) => match (num.trim().parse::<f64>(), den.trim().parse::<f64>()) {
            (Ok(n), Ok(d)) if d > 0.0 => Some(n / d),
            _ => None,
        },
        None => raw.trim().parse::<f64>().ok(),
    };

    match value {
        Some(fps) => format!("{:.2} fps", fps),
        None => "Unknown".to_string(),
    }
}

/// Compact view counter, e.g. "1.2M"
pub fn format_views(count: Option<u64>) -> String {
    match count {
        None | Some(0) => "Unknown".to_string(),
        Some(n) if n >= 1_000_000_000 => format!("{:.1}B", n as f64 / 1e9),
        Some(n) if n >= 1_000_000 => format!("{:.1}M", n as f64 / 1e6),
        Some(n) if n >= 1_000 => format!("{:.1}K", n as f64 / 1e3),
        Some(n) => n.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_file_size() {
        assert_eq!(format_file_size(512), "512 B");
        assert_eq!(format_file_size(1536), "1.5 KB");
        assert_eq!(format_file_size(15 * 1024 * 1024 + 512 * 1024), "15.5 MB");
        assert_eq!(format_file_size(2 * 1024 * 1024 * 1024), "2.0 GB");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0.0), "Unknown");
        assert_eq!(format_duration(65.4), "01:05");
        assert_eq!(format_duration(3725.0), "01:02:05");
    }

    #[test]
    fn test_format_bitrate() {
        assert_eq!(format_bitrate(0), "Unknown");
        assert_eq!(format_bitrate(192_000), "192 kbps");
        assert_eq!(format_bitrate(4_500_000), "4.5 Mbps");
    }

    #[test]
    fn test_format_frame_rate() {
        assert_eq!(format_frame_rate("30/1"), "30.00 fps");
        assert_eq!(format_frame_rate("30000/1001"), "29.97 fps");
        assert_eq!(format_frame_rate("25"), "25.00 fps");
        assert_eq!(format_frame_rate("0/0"), "Unknown");
        assert_eq!(format_frame_rate("garbage"), "Unknown");
    }

    #[test]
    fn test_format_views() {
        assert_eq!(format_views(None), "Unknown");
        assert_eq!(format_views(Some(999)), "999");
        assert_eq!(format_views(Some(1_260)), "1.3K");
        assert_eq!(format_views(Some(3_400_000)), "3.4M");
        assert_eq!(format_views(Some(2_000_000_000)), "2.0B");
    }
}
