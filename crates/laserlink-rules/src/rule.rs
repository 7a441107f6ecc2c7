//! Schedule rules.
//!
//! A rule says "between `window_start` and `window_end` this device shows
//! `scene_command`", with `off_mode` deciding what happens outside every
//! window. Windows are minutes since local midnight, end-exclusive, and wrap
//! past midnight when `window_end <= window_start`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use laserlink_core::{validate_device_id, DeviceId};

use crate::error::{Result, RuleError};

/// Minutes in a day.
pub const MINUTES_PER_DAY: u16 = 1440;

/// How a device is switched off outside its windows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OffMode {
    /// Run the timed OFF macro.
    #[serde(rename = "OFF")]
    Macro,
    /// Append one literal OFF command.
    #[serde(rename = "DIRECT")]
    Direct,
}

impl OffMode {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_uppercase().as_str() {
            "OFF" | "MACRO" => Ok(OffMode::Macro),
            "DIRECT" => Ok(OffMode::Direct),
            other => Err(RuleError::Validation(format!(
                "off_mode must be OFF or DIRECT, got '{}'",
                other
            ))),
        }
    }
}

/// A validated, stored rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduleRule {
    pub id: u64,
    /// `None` applies to every device.
    pub device_id: Option<DeviceId>,
    pub window_start: u16,
    pub window_end: u16,
    /// Scene argument string, e.g. `"3"` or `"3 80"`.
    pub scene_command: String,
    pub off_mode: OffMode,
    pub priority: i32,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ScheduleRule {
    /// Whether `minute` (0..1440) falls inside the window.
    pub fn contains(&self, minute: u16) -> bool {
        window_contains(self.window_start, self.window_end, minute)
    }

    /// Whether the rule targets `device`, either by name or as a wildcard.
    pub fn applies_to(&self, device: &str) -> bool {
        match &self.device_id {
            Some(id) => id == device,
            None => true,
        }
    }

    pub fn is_wildcard(&self) -> bool {
        self.device_id.is_none()
    }

    /// `HH:MM-HH:MM`, for logs and listings.
    pub fn window_label(&self) -> String {
        format!(
            "{}-{}",
            format_hhmm(self.window_start),
            format_hhmm(self.window_end)
        )
    }
}

/// `[start, end)` containment with midnight wrap; `start == end` is all day.
pub fn window_contains(start: u16, end: u16, minute: u16) -> bool {
    if start == end {
        return true;
    }
    if start < end {
        minute >= start && minute < end
    } else {
        minute >= start || minute < end
    }
}

/// Parse `"HH:MM"` into minutes since midnight.
pub fn parse_hhmm(raw: &str) -> Option<u16> {
    let (h, m) = raw.trim().split_once(':')?;
    let h: u16 = h.trim().parse().ok()?;
    let m: u16 = m.trim().parse().ok()?;
    if h < 24 && m < 60 {
        Some(h * 60 + m)
    } else {
        None
    }
}

pub fn format_hhmm(minutes: u16) -> String {
    format!("{:02}:{:02}", minutes / 60, minutes % 60)
}

/// Rule as submitted by an operator.
///
/// Window bounds come either as minutes or as `"HH:MM"`; minutes win when
/// both are present and valid.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScheduleRuleInput {
    #[serde(default)]
    pub id: Option<u64>,
    #[serde(default)]
    pub device_id: Option<String>,
    #[serde(default)]
    pub window_start: Option<i64>,
    #[serde(default)]
    pub window_end: Option<i64>,
    #[serde(default)]
    pub start_time: Option<String>,
    #[serde(default)]
    pub end_time: Option<String>,
    #[serde(default)]
    pub scene_command: Option<String>,
    #[serde(default)]
    pub off_mode: Option<String>,
    #[serde(default)]
    pub priority: Option<i32>,
    #[serde(default)]
    pub enabled: Option<bool>,
}

fn resolve_bound(minutes: Option<i64>, hhmm: Option<&str>, name: &str) -> Result<u16> {
    if let Some(m) = minutes {
        if (0..i64::from(MINUTES_PER_DAY)).contains(&m) {
            return Ok(m as u16);
        }
    }
    if let Some(parsed) = hhmm.and_then(parse_hhmm) {
        return Ok(parsed);
    }
    Err(RuleError::Validation(format!(
        "{} requires minutes 0-1439 or an HH:MM time",
        name
    )))
}

/// Strip an optional leading `SCENE` word and surrounding whitespace.
pub fn normalize_scene_command(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    let rest = match trimmed.get(..5) {
        Some(head)
            if head.eq_ignore_ascii_case("SCENE")
                && trimmed[5..].chars().next().map_or(true, char::is_whitespace) =>
        {
            trimmed[5..].trim()
        }
        _ => trimmed,
    };
    if rest.is_empty() {
        return Err(RuleError::Validation(
            "scene_command must name a scene".to_string(),
        ));
    }
    Ok(rest.to_string())
}

impl ScheduleRuleInput {
    /// Validate into a rule with `id`. `created_at` is kept from an existing
    /// rule when updating.
    pub fn into_rule(self, id: u64, created_at: Option<DateTime<Utc>>) -> Result<ScheduleRule> {
        let device_id = match self.device_id.as_deref().map(str::trim) {
            None | Some("") | Some("*") => None,
            Some(raw) => Some(validate_device_id(raw)?),
        };
        let window_start =
            resolve_bound(self.window_start, self.start_time.as_deref(), "window start")?;
        let window_end = resolve_bound(self.window_end, self.end_time.as_deref(), "window end")?;
        let scene_command = normalize_scene_command(self.scene_command.as_deref().unwrap_or(""))?;
        let off_mode = match self.off_mode.as_deref() {
            Some(raw) if !raw.trim().is_empty() => OffMode::parse(raw)?,
            _ => OffMode::Macro,
        };

        let now = Utc::now();
        Ok(ScheduleRule {
            id,
            device_id,
            window_start,
            window_end,
            scene_command,
            off_mode,
            priority: self.priority.unwrap_or(0),
            enabled: self.enabled.unwrap_or(true),
            created_at: created_at.unwrap_or(now),
            updated_at: now,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input(start: Option<i64>, end: Option<i64>) -> ScheduleRuleInput {
        ScheduleRuleInput {
            window_start: start,
            window_end: end,
            scene_command: Some("3".to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn test_overnight_window() {
        assert!(window_contains(1380, 60, 23 * 60 + 45));
        assert!(window_contains(1380, 60, 15));
        assert!(!window_contains(1380, 60, 12 * 60));
        assert!(!window_contains(1380, 60, 60));
        assert!(window_contains(1380, 60, 1380));
    }

    #[test]
    fn test_day_window_and_full_day() {
        assert!(window_contains(480, 1020, 480));
        assert!(!window_contains(480, 1020, 1020));
        assert!(window_contains(600, 600, 0));
        assert!(window_contains(600, 600, 1439));
    }

    #[test]
    fn test_parse_hhmm() {
        assert_eq!(parse_hhmm("23:00"), Some(1380));
        assert_eq!(parse_hhmm(" 7:05 "), Some(425));
        assert_eq!(parse_hhmm("24:00"), None);
        assert_eq!(parse_hhmm("12:60"), None);
        assert_eq!(parse_hhmm("noon"), None);
    }

    #[test]
    fn test_minutes_win_over_strings() {
        let mut raw = input(Some(600), Some(660));
        raw.start_time = Some("01:00".to_string());
        let rule = raw.into_rule(1, None).unwrap();
        assert_eq!(rule.window_start, 600);

        let mut raw = input(Some(5000), None);
        raw.start_time = Some("01:00".to_string());
        raw.end_time = Some("02:30".to_string());
        let rule = raw.into_rule(1, None).unwrap();
        assert_eq!((rule.window_start, rule.window_end), (60, 150));
    }

    #[test]
    fn test_missing_window_rejected() {
        assert!(input(None, Some(60)).into_rule(1, None).unwrap_err().is_validation());
        let mut raw = input(Some(-1), Some(60));
        raw.start_time = Some("bad".to_string());
        assert!(raw.into_rule(1, None).is_err());
    }

    #[test]
    fn test_scene_and_mode_normalization() {
        let mut raw = input(Some(0), Some(60));
        raw.scene_command = Some(" scene 4 80 ".to_string());
        raw.off_mode = Some("direct".to_string());
        raw.device_id = Some("*".to_string());
        let rule = raw.into_rule(9, None).unwrap();
        assert_eq!(rule.scene_command, "4 80");
        assert_eq!(rule.off_mode, OffMode::Direct);
        assert!(rule.is_wildcard());
        assert!(rule.enabled);

        let mut raw = input(Some(0), Some(60));
        raw.scene_command = Some("SCENE".to_string());
        assert!(raw.into_rule(1, None).is_err());

        let mut raw = input(Some(0), Some(60));
        raw.off_mode = Some("later".to_string());
        assert!(raw.into_rule(1, None).is_err());
    }
}
