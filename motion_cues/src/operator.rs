// THEORY:
// Operator input (key presses, pointer drags, lines typed into a console) only
// ever does a handful of things to a running pipeline: ask for a new background,
// forget the background, move the threshold, or toggle debug output. This
// module gives those effects a name so input handling and the pipeline never
// need to know about each other.

/// An effect requested by the operator, applied between ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorCommand {
    /// Capture the background from the next frame.
    LearnBackground,
    /// Drop the background; background stages go quiet until the next capture.
    ClearBackground,
    RaiseThreshold(u8),
    LowerThreshold(u8),
    SetThreshold(u8),
    /// Pointer dragged to `x` on the operator's view; maps the view width onto 0..=255.
    PointerThreshold { x: i32 },
    ToggleDebug,
}

impl OperatorCommand {
    /// Single-key shortcuts.
    pub fn from_key(key: char) -> Option<Self> {
        match key {
            ' ' => Some(OperatorCommand::LearnBackground),
            'c' => Some(OperatorCommand::ClearBackground),
            '+' | '=' => Some(OperatorCommand::RaiseThreshold(1)),
            '-' | '_' => Some(OperatorCommand::LowerThreshold(1)),
            'd' => Some(OperatorCommand::ToggleDebug),
            _ => None,
        }
    }

    /// Parses one line of console input.
    ///
    /// Accepts a single key (`b` stands in for the space bar, which a line
    /// reader trims away), `t <0-255>` to set the threshold, and `x <pixels>`
    /// for a pointer position.
    pub fn parse_line(line: &str) -> Option<Self> {
        let line = line.trim();
        let mut parts = line.split_whitespace();
        let head = parts.next()?;
        let arg = parts.next();

        match (head, arg) {
            ("t", Some(value)) => value.parse().ok().map(OperatorCommand::SetThreshold),
            ("x", Some(value)) => value
                .parse()
                .ok()
                .map(|x| OperatorCommand::PointerThreshold { x }),
            ("b", None) => Some(OperatorCommand::LearnBackground),
            (key, None) if key.chars().count() == 1 => key.chars().next().and_then(Self::from_key),
            _ => None,
        }
    }
}

/// Applies a threshold command to `current`, saturating at both ends.
pub fn adjust_threshold(current: u8, command: OperatorCommand, draw_width: u32) -> u8 {
    match command {
        OperatorCommand::RaiseThreshold(step) => current.saturating_add(step),
        OperatorCommand::LowerThreshold(step) => current.saturating_sub(step),
        OperatorCommand::SetThreshold(value) => value,
        OperatorCommand::PointerThreshold { x } => {
            let width = draw_width.max(1) as i64;
            let x = (x as i64).clamp(0, width);
            (x * 255 / width) as u8
        }
        _ => current,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_map_to_commands() {
        assert_eq!(OperatorCommand::from_key(' '), Some(OperatorCommand::LearnBackground));
        assert_eq!(OperatorCommand::from_key('+'), Some(OperatorCommand::RaiseThreshold(1)));
        assert_eq!(OperatorCommand::from_key('-'), Some(OperatorCommand::LowerThreshold(1)));
        assert_eq!(OperatorCommand::from_key('d'), Some(OperatorCommand::ToggleDebug));
        assert_eq!(OperatorCommand::from_key('q'), None);
    }

    #[test]
    fn lines_with_arguments() {
        assert_eq!(OperatorCommand::parse_line("t 80"), Some(OperatorCommand::SetThreshold(80)));
        assert_eq!(
            OperatorCommand::parse_line("  x 160 "),
            Some(OperatorCommand::PointerThreshold { x: 160 })
        );
        assert_eq!(OperatorCommand::parse_line("b"), Some(OperatorCommand::LearnBackground));
        assert_eq!(OperatorCommand::parse_line("+"), Some(OperatorCommand::RaiseThreshold(1)));
        assert_eq!(OperatorCommand::parse_line("t 300"), None);
        assert_eq!(OperatorCommand::parse_line(""), None);
        assert_eq!(OperatorCommand::parse_line("hello"), None);
    }

    #[test]
    fn threshold_saturates() {
        assert_eq!(adjust_threshold(255, OperatorCommand::RaiseThreshold(1), 320), 255);
        assert_eq!(adjust_threshold(0, OperatorCommand::LowerThreshold(5), 320), 0);
        assert_eq!(adjust_threshold(10, OperatorCommand::SetThreshold(99), 320), 99);
        assert_eq!(adjust_threshold(10, OperatorCommand::ToggleDebug, 320), 10);
    }

    #[test]
    fn pointer_maps_view_width_onto_full_range() {
        assert_eq!(adjust_threshold(0, OperatorCommand::PointerThreshold { x: 0 }, 320), 0);
        assert_eq!(adjust_threshold(0, OperatorCommand::PointerThreshold { x: 160 }, 320), 127);
        assert_eq!(adjust_threshold(0, OperatorCommand::PointerThreshold { x: 320 }, 320), 255);
        assert_eq!(adjust_threshold(0, OperatorCommand::PointerThreshold { x: -40 }, 320), 0);
        assert_eq!(adjust_threshold(0, OperatorCommand::PointerThreshold { x: 9999 }, 320), 255);
    }
}
