use crate::prelude::*;

pub fn now() -> DateTime {
  Utc::now().naive_utc()
}

pub fn format_date(date: DateTime) -> String {
  date.format("%d.%m.%Y %H:%M").to_string()
}

pub fn format_duration(duration: TimeDelta) -> String {
  format!(
    "{}d {}h {}m",
    duration.num_days(),
    duration.num_hours() % 24,
    duration.num_minutes() % 60
  )
}

/// Renders minor units as `123.45`.
pub fn format_money(minor: i64) -> String {
  let sign = if minor < 0 { "-" } else { "" };
  let minor = minor.unsigned_abs();
  format!("{sign}{}.{:02}", minor / 100, minor % 100)
}

/// Maximum message length for Telegram Bot API (4096 characters).
/// We use a slightly smaller limit to account for potential HTML entity expansion.
const TELEGRAM_MAX_MESSAGE_LENGTH: usize = 4000;

/// Splits a long message into chunks that fit within Telegram's message limit.
/// Attempts to split at newline boundaries to preserve formatting.
pub fn chunk_message(text: &str, max_len: usize) -> Vec<String> {
  let max_len =
    if max_len == 0 { TELEGRAM_MAX_MESSAGE_LENGTH } else { max_len };

  if text.len() <= max_len {
    return vec![text.to_string()];
  }

  let mut chunks = Vec::new();
  let mut current = String::new();

  for line in text.lines() {
    if !current.is_empty() && current.len() + line.len() + 1 > max_len {
      chunks.push(std::mem::take(&mut current));
    }

    if line.len() > max_len {
      if !current.is_empty() {
        chunks.push(std::mem::take(&mut current));
      }
      let mut remaining = line;
      while remaining.len() > max_len {
        let mut cut = max_len;
        while !remaining.is_char_boundary(cut) {
          cut -= 1;
        }
        if cut == 0 {
          // a single char wider than the limit still has to go somewhere
          cut = remaining.chars().next().map_or(remaining.len(), char::len_utf8);
        }
        chunks.push(remaining[..cut].to_string());
        remaining = &remaining[cut..];
      }
      current = remaining.to_string();
    } else {
      if !current.is_empty() {
        current.push('\n');
      }
      current.push_str(line);
    }
  }

  if !current.is_empty() {
    chunks.push(current);
  }

  chunks
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn money_is_rendered_with_two_decimals() {
    assert_eq!(format_money(50_000), "500.00");
    assert_eq!(format_money(25_005), "250.05");
    assert_eq!(format_money(-1_50), "-1.50");
    assert_eq!(format_money(0), "0.00");
  }

  #[test]
  fn long_messages_are_split_on_lines() {
    let text = "aaaa\nbbbb\ncccc";
    assert_eq!(chunk_message(text, 9), vec!["aaaa\nbbbb", "cccc"]);
    assert_eq!(chunk_message(text, 0), vec![text]);
  }

  #[test]
  fn oversized_line_is_hard_split() {
    let chunks = chunk_message("abcdefghij", 4);
    assert_eq!(chunks, vec!["abcd", "efgh", "ij"]);
  }

  #[test]
  fn limit_below_char_width_keeps_whole_chars() {
    assert_eq!(chunk_message("ёж", 1), vec!["ё", "ж"]);
    assert_eq!(chunk_message("a€b", 2), vec!["a", "€", "b"]);
  }
}
