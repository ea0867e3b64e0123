use std::collections::HashMap;
use std::sync::LazyLock;

use minijinja::value::Value;
use minijinja::{Environment, Error, ErrorKind};
use time::format_description::modifier::{
    Day, Hour, Minute, Month, MonthRepr, OffsetHour, OffsetMinute, Ordinal, Period, Second,
    Weekday, WeekdayRepr, Year, YearRepr,
};
use time::format_description::well_known::Rfc3339;
use time::format_description::{Component, OwnedFormatItem};
use time::macros::format_description;
use time::{Date, OffsetDateTime, UtcOffset};

use crate::markdown::render_markdown;
use crate::utils::{absolute_url, slugify};

static FORMAT_CACHE: LazyLock<HashMap<&'static str, Vec<OwnedFormatItem>>> = LazyLock::new(|| {
    ["%Y-%m-%d", "%d %b %Y", "%B %-d, %Y", "%H:%M"]
        .into_iter()
        .filter_map(|pattern| Some((pattern, translate_strftime_uncached(pattern).ok()?)))
        .collect()
});

/// Site-level values the URL and date filters close over.
#[derive(Debug, Clone)]
pub struct FilterContext {
    pub url: String,
    pub baseurl: String,
    pub offset: UtcOffset,
}

pub fn register(env: &mut Environment<'static>, context: FilterContext) {
    let offset = context.offset;
    env.add_filter("date", move |value: Value, format: String| {
        format_date(&value, &format, offset)
    });
    env.add_filter("date_to_xmlschema", move |value: Value| {
        let datetime = parse_datetime(&value, offset)?;
        datetime.format(&Rfc3339).map(Value::from).map_err(|err| {
            Error::new(
                ErrorKind::InvalidOperation,
                format!("failed to format datetime: {err}"),
            )
        })
    });
    env.add_filter("date_to_string", move |value: Value| {
        format_date(&value, "%d %b %Y", offset)
    });

    let baseurl = context.baseurl.clone();
    env.add_filter("relative_url", move |path: &str| {
        relative_url(&baseurl, path)
    });
    let site_url = context.url.clone();
    let baseurl = context.baseurl;
    env.add_filter("absolute_url", move |path: &str| {
        let relative = relative_url(&baseurl, path);
        if site_url.is_empty() {
            relative
        } else {
            absolute_url(&site_url, &relative)
        }
    });

    env.add_filter("slugify", |value: &str| slugify(value));
    env.add_filter("jsonify", jsonify);
    env.add_filter("xml_escape", xml_escape);
    env.add_filter("markdownify", markdownify);
    env.add_filter("number_of_words", |value: &str| value.split_whitespace().count());
}

fn relative_url(baseurl: &str, path: &str) -> String {
    let base = baseurl.trim_end_matches('/');
    if path.is_empty() {
        return format!("{base}/");
    }
    if path.starts_with('/') {
        format!("{base}{path}")
    } else {
        format!("{base}/{path}")
    }
}

fn jsonify(value: Value) -> Result<String, Error> {
    serde_json::to_string(&value).map_err(|err| {
        Error::new(
            ErrorKind::InvalidOperation,
            format!("jsonify failed: {err}"),
        )
    })
}

fn xml_escape(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            other => escaped.push(other),
        }
    }
    escaped
}

fn markdownify(value: &str) -> Result<String, Error> {
    render_markdown(value).map_err(|err| {
        Error::new(
            ErrorKind::InvalidOperation,
            format!("markdownify failed: {err:#}"),
        )
    })
}

fn format_date(value: &Value, format: &str, offset: UtcOffset) -> Result<Value, Error> {
    if value.is_undefined() || value.is_none() || value.as_str().is_some_and(str::is_empty) {
        return Ok(Value::from(""));
    }
    let datetime = parse_datetime(value, offset)?;
    let format_items = translate_strftime(format)?;
    let formatted = datetime.format(&format_items).map_err(|err| {
        Error::new(
            ErrorKind::InvalidOperation,
            format!("failed to format datetime: {err}"),
        )
    })?;
    Ok(Value::from(formatted))
}

/// Accepts RFC 3339 strings, bare `YYYY-MM-DD` dates, and `now`/`today`.
fn parse_datetime(value: &Value, offset: UtcOffset) -> Result<OffsetDateTime, Error> {
    let Some(raw) = value.as_str().map(str::trim) else {
        return Err(Error::new(
            ErrorKind::InvalidOperation,
            "date filters expect a string input",
        ));
    };

    if raw.eq_ignore_ascii_case("now") || raw.eq_ignore_ascii_case("today") {
        return Ok(OffsetDateTime::now_utc().to_offset(offset));
    }
    if let Ok(datetime) = OffsetDateTime::parse(raw, &Rfc3339) {
        return Ok(datetime);
    }
    if let Ok(date) = Date::parse(raw, format_description!("[year]-[month]-[day]")) {
        return Ok(date.midnight().assume_offset(offset));
    }

    Err(Error::new(
        ErrorKind::InvalidOperation,
        format!("date filters require RFC3339 datetimes or YYYY-MM-DD dates; got '{raw}'"),
    ))
}

fn translate_strftime(format: &str) -> Result<Vec<OwnedFormatItem>, Error> {
    if let Some(cached) = FORMAT_CACHE.get(format) {
        return Ok(cached.clone());
    }
    translate_strftime_uncached(format)
}

fn translate_strftime_uncached(format: &str) -> Result<Vec<OwnedFormatItem>, Error> {
    use OwnedFormatItem as Item;

    let mut items: Vec<Item> = Vec::new();
    let mut literal: Vec<u8> = Vec::new();
    let mut chars = format.chars().peekable();

    let flush_literal = |items: &mut Vec<Item>, buf: &mut Vec<u8>| {
        if !buf.is_empty() {
            items.push(Item::Literal(std::mem::take(buf).into_boxed_slice()));
        }
    };

    while let Some(ch) = chars.next() {
        if ch != '%' {
            let mut encoded = [0u8; 4];
            literal.extend_from_slice(ch.encode_utf8(&mut encoded).as_bytes());
            continue;
        }

        // `%-d` and friends drop zero padding.
        let unpadded = chars.next_if_eq(&'-').is_some();
        let Some(code) = chars.next() else {
            return Err(Error::new(
                ErrorKind::InvalidOperation,
                "date filter received a dangling '%'",
            ));
        };
        if code == '%' {
            literal.push(b'%');
            continue;
        }
        flush_literal(&mut items, &mut literal);

        let component = match code {
            'Y' => Component::Year(Year::default()),
            'y' => {
                let mut year = Year::default();
                year.repr = YearRepr::LastTwo;
                Component::Year(year)
            }
            'm' => {
                let mut month = Month::default();
                if unpadded {
                    month.padding = time::format_description::modifier::Padding::None;
                }
                Component::Month(month)
            }
            'b' => {
                let mut month = Month::default();
                month.repr = MonthRepr::Short;
                Component::Month(month)
            }
            'B' => {
                let mut month = Month::default();
                month.repr = MonthRepr::Long;
                Component::Month(month)
            }
            'd' | 'e' => {
                let mut day = Day::default();
                if unpadded {
                    day.padding = time::format_description::modifier::Padding::None;
                }
                Component::Day(day)
            }
            'j' => Component::Ordinal(Ordinal::default()),
            'H' => Component::Hour(Hour::default()),
            'I' => {
                let mut hour = Hour::default();
                hour.is_12_hour_clock = true;
                Component::Hour(hour)
            }
            'M' => Component::Minute(Minute::default()),
            'S' => Component::Second(Second::default()),
            'a' => {
                let mut weekday = Weekday::default();
                weekday.repr = WeekdayRepr::Short;
                Component::Weekday(weekday)
            }
            'A' => Component::Weekday(Weekday::default()),
            'p' => Component::Period(Period::default()),
            'z' => {
                let mut hour = OffsetHour::default();
                hour.sign_is_mandatory = true;
                items.push(Component::OffsetHour(hour).into());
                Component::OffsetMinute(OffsetMinute::default())
            }
            'F' => {
                items.extend(translate_strftime_uncached("%Y-%m-%d")?);
                continue;
            }
            'T' => {
                items.extend(translate_strftime_uncached("%H:%M:%S")?);
                continue;
            }
            other => {
                return Err(Error::new(
                    ErrorKind::InvalidOperation,
                    format!("date filter does not support %{other}"),
                ));
            }
        };
        items.push(component.into());
    }

    flush_literal(&mut items, &mut literal);
    Ok(items)
}
