//! XMLTV guide data.
//!
//! Playlists carry no schedule, so the guide lists one-hour placeholder
//! programmes for the next 24 hours. Media servers need it to map lineup
//! entries to guide channels.

use chrono::{DateTime, Duration, Timelike, Utc};
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use thiserror::Error;

use crate::playlist::Channel;

/// Generator name written on the root element.
pub const GENERATOR_NAME: &str = "IPTV Tuner";

/// Placeholder programmes per channel.
const PROGRAMME_HOURS: i64 = 24;

const XMLTV_TIME_FORMAT: &str = "%Y%m%d%H%M%S +0000";

#[derive(Error, Debug)]
pub enum EpgError {
    #[error("XML write error: {0}")]
    Xml(#[from] quick_xml::Error),

    #[error("XML write error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Guide is not valid UTF-8: {0}")]
    Utf8(#[from] std::string::FromUtf8Error),
}

/// Guide name: guide number first, unless the name already starts with it.
pub fn guide_display_name(channel: &Channel) -> String {
    let number = &channel.guide_number;
    if channel.name.starts_with(&format!("{} ", number)) || channel.name.starts_with(&format!("{}.", number)) {
        channel.name.clone()
    } else {
        format!("{} {}", number, channel.name)
    }
}

fn text_element(
    writer: &mut Writer<Vec<u8>>,
    name: &str,
    attributes: &[(&str, &str)],
    text: &str,
) -> Result<(), EpgError> {
    let mut start = BytesStart::new(name);
    for attribute in attributes {
        start.push_attribute(*attribute);
    }
    writer.write_event(Event::Start(start))?;
    writer.write_event(Event::Text(BytesText::new(text)))?;
    writer.write_event(Event::End(BytesEnd::new(name)))?;
    Ok(())
}

/// Render the guide for `channels`, starting at the hour containing `now`.
pub fn generate_xmltv(channels: &[Channel], now: DateTime<Utc>) -> Result<String, EpgError> {
    let first_hour = now
        .with_minute(0)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(now);

    let mut writer = Writer::new_with_indent(Vec::new(), b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    let mut tv = BytesStart::new("tv");
    tv.push_attribute(("generator-info-name", GENERATOR_NAME));
    writer.write_event(Event::Start(tv))?;

    for channel in channels {
        let mut element = BytesStart::new("channel");
        element.push_attribute(("id", channel.id.as_str()));
        writer.write_event(Event::Start(element))?;
        text_element(&mut writer, "display-name", &[], &guide_display_name(channel))?;
        if let Some(logo) = &channel.logo {
            let mut icon = BytesStart::new("icon");
            icon.push_attribute(("src", logo.as_str()));
            writer.write_event(Event::Empty(icon))?;
        }
        writer.write_event(Event::End(BytesEnd::new("channel")))?;
    }

    for channel in channels {
        let category = if channel.category.is_empty() {
            "General"
        } else {
            channel.category.as_str()
        };
        for hour in 0..PROGRAMME_HOURS {
            let start = first_hour + Duration::hours(hour);
            let stop = start + Duration::hours(1);
            let start = start.format(XMLTV_TIME_FORMAT).to_string();
            let stop = stop.format(XMLTV_TIME_FORMAT).to_string();

            let mut programme = BytesStart::new("programme");
            programme.push_attribute(("start", start.as_str()));
            programme.push_attribute(("stop", stop.as_str()));
            programme.push_attribute(("channel", channel.id.as_str()));
            writer.write_event(Event::Start(programme))?;
            text_element(
                &mut writer,
                "title",
                &[("lang", "en")],
                &format!("{} - Program {:02}:00", channel.name, hour),
            )?;
            text_element(
                &mut writer,
                "desc",
                &[("lang", "en")],
                &format!("Live broadcast on {}", channel.name),
            )?;
            text_element(&mut writer, "category", &[("lang", "en")], category)?;
            writer.write_event(Event::End(BytesEnd::new("programme")))?;
        }
    }

    writer.write_event(Event::End(BytesEnd::new("tv")))?;
    Ok(String::from_utf8(writer.into_inner())?)
}
