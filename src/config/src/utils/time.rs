// Copyright 2025 OpenObserve Inc.
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

use std::time::Duration;

use chrono::{DateTime, Utc};

#[inline(always)]
pub fn now() -> DateTime<Utc> {
    Utc::now()
}

#[inline(always)]
pub fn now_micros() -> i64 {
    Utc::now().timestamp_micros()
}

/// Parses the engine's compact duration format: `HH:mm:ss[.f]` or
/// `d.HH:mm:ss[.f]`. Empty or unparseable input yields `None` so the caller
/// can fall back to its configured default.
pub fn parse_refresh_interval(s: &str) -> Option<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    let parts: Vec<&str> = s.split(':').collect();
    if parts.len() != 3 {
        return None;
    }
    let (days, hours) = match parts[0].split_once('.') {
        Some((d, h)) => (parse_unit(d)?, parse_unit(h)?),
        None => (0, parse_unit(parts[0])?),
    };
    let minutes = parse_unit(parts[1])?;
    let (secs, nanos) = match parts[2].split_once('.') {
        Some((sec, frac)) => (parse_unit(sec)?, parse_fraction(frac)?),
        None => (parse_unit(parts[2])?, 0),
    };
    if hours > 23 || minutes > 59 || secs > 59 {
        return None;
    }
    let total = days * 86400 + hours * 3600 + minutes * 60 + secs;
    Some(Duration::new(total, nanos))
}

/// Inverse of [`parse_refresh_interval`], trailing zeros of the fraction
/// trimmed.
pub fn format_refresh_interval(d: Duration) -> String {
    let total = d.as_secs();
    let days = total / 86400;
    let hours = total % 86400 / 3600;
    let minutes = total % 3600 / 60;
    let secs = total % 60;
    let mut out = if days > 0 {
        format!("{days}.{hours:02}:{minutes:02}:{secs:02}")
    } else {
        format!("{hours:02}:{minutes:02}:{secs:02}")
    };
    let nanos = d.subsec_nanos();
    if nanos > 0 {
        let frac = format!("{nanos:09}");
        out.push('.');
        out.push_str(frac.trim_end_matches('0'));
    }
    out
}

fn parse_unit(s: &str) -> Option<u64> {
    if s.is_empty() || !s.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}

fn parse_fraction(s: &str) -> Option<u32> {
    if s.is_empty() || s.len() > 9 || !s.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let padded = format!("{s:0<9}");
    padded.parse().ok()
}
