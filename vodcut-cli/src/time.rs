use crate::error::AppError;

/// Parse a time offset into seconds.
///
/// Accepts plain seconds (`90`, `12.5`), unit groups (`1h2m3s`, `45m`, `1.5h`) and clock
/// notation (`1:02:03`, `02:03`, `00:00:12.5`).
pub fn parse_time(time_str: &str) -> Result<f64, AppError> {
    let time_str = time_str.trim();
    if time_str.is_empty() {
        return Err(AppError::ParseError("Invalid format: empty string".to_string()));
    }

    let seconds = if let Ok(seconds) = time_str.parse::<f64>() {
        seconds
    } else if time_str.contains(':') {
        parse_clock(time_str)?
    } else {
        parse_units(time_str)?
    };

    if !seconds.is_finite() || seconds < 0.0 {
        return Err(AppError::ParseError(format!(
            "time must be a non-negative number of seconds: {time_str}"
        )));
    }
    Ok(seconds)
}

fn parse_clock(time_str: &str) -> Result<f64, AppError> {
    let parts: Vec<&str> = time_str.split(':').collect();
    if parts.len() > 3 {
        return Err(AppError::ParseError(format!("Invalid clock time: {time_str}")));
    }

    let mut total = 0.0;
    for (i, part) in parts.iter().enumerate() {
        let is_seconds = i == parts.len() - 1;
        let value = part
            .parse::<f64>()
            .ok()
            .filter(|v| *v >= 0.0 && (is_seconds || v.fract() == 0.0))
            .ok_or_else(|| AppError::ParseError(format!("Invalid clock time: {time_str}")))?;
        total = total * 60.0 + value;
    }
    Ok(total)
}

fn parse_units(time_str: &str) -> Result<f64, AppError> {
    let mut total = 0.0;
    let mut number = String::new();

    for c in time_str.chars() {
        if c.is_ascii_digit() || c == '.' {
            number.push(c);
            continue;
        }
        let multiplier = match c.to_ascii_lowercase() {
            'h' => 3600.0,
            'm' => 60.0,
            's' => 1.0,
            _ => return Err(AppError::ParseError(format!("Invalid unit '{c}' in {time_str}"))),
        };
        let value = number
            .parse::<f64>()
            .map_err(|_| AppError::ParseError(format!("Invalid number in {time_str}")))?;
        total += value * multiplier;
        number.clear();
    }

    if !number.is_empty() {
        return Err(AppError::ParseError(format!(
            "Missing unit after '{number}' in {time_str}"
        )));
    }
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_seconds() {
        assert_eq!(parse_time("90").unwrap(), 90.0);
        assert_eq!(parse_time(" 12.5 ").unwrap(), 12.5);
    }

    #[test]
    fn unit_groups() {
        assert_eq!(parse_time("1h2m3s").unwrap(), 3723.0);
        assert_eq!(parse_time("45m").unwrap(), 2700.0);
        assert_eq!(parse_time("1.5H").unwrap(), 5400.0);
        assert_eq!(parse_time("30s").unwrap(), 30.0);
    }

    #[test]
    fn clock_notation() {
        assert_eq!(parse_time("1:02:03").unwrap(), 3723.0);
        assert_eq!(parse_time("02:03").unwrap(), 123.0);
        assert_eq!(parse_time("00:00:12.5").unwrap(), 12.5);
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse_time("").is_err());
        assert!(parse_time("-5").is_err());
        assert!(parse_time("10x").is_err());
        assert!(parse_time("1h30").is_err());
        assert!(parse_time("1:2:3:4").is_err());
        assert!(parse_time("1.5:00").is_err());
    }
}
