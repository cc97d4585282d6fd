/// Renders a countdown as mm:ss; hour-long papers still read naturally
/// as total minutes.
pub fn format_clock(seconds: u32) -> String {
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}

pub fn format_mbps(speed: Option<f64>) -> String {
    match speed {
        Some(mbps) => format!("{:.2} Mbps", mbps),
        None => "n/a".to_string(),
    }
}
