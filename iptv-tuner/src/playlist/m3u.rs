//! Extended M3U parser.
//!
//! Only `#EXTINF` entries are interpreted:
//!
//! ```text
//! #EXTINF:-1 tvg-name="Science" tvg-logo="http://..." group-title="Documentary",Science Channel
//! http://provider/live/user/pass/1234.ts
//! ```

use std::collections::BTreeMap;

use log::{debug, info};
use nom::{
    bytes::complete::{tag_no_case, take_till, take_while1},
    character::complete::{char, multispace0},
    combinator::{eof, opt, rest},
    multi::many0,
    sequence::{delimited, preceded, separated_pair},
    IResult,
};

use super::models::{Channel, ContentType, UNCATEGORIZED};
use super::store::ChannelLineup;

/// Lines after `#EXTINF` searched for the entry URL.
const URL_LOOKAHEAD: usize = 4;

/// Attributes and title of one `#EXTINF` line.
#[derive(Debug, Default, PartialEq, Eq)]
struct ExtInf {
    /// Keys are lowercased.
    attributes: Vec<(String, String)>,
    title: Option<String>,
}

impl ExtInf {
    fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }
}

fn attribute(input: &str) -> IResult<&str, (&str, &str)> {
    separated_pair(
        take_while1(|c: char| c.is_ascii_alphanumeric() || c == '-' || c == '_'),
        char('='),
        delimited(char('"'), take_till(|c| c == '"'), char('"')),
    )(input)
}

fn extinf(input: &str) -> IResult<&str, ExtInf> {
    let (input, _) = tag_no_case("#EXTINF:")(input)?;
    let (input, _duration) = take_till(|c: char| c.is_whitespace() || c == ',')(input)?;
    let (input, attributes) = many0(preceded(multispace0, attribute))(input)?;
    let (input, _) = multispace0(input)?;
    let (input, title) = opt(preceded(char(','), rest))(input)?;
    let (input, _) = eof(input)?;

    Ok((
        input,
        ExtInf {
            attributes: attributes
                .into_iter()
                .map(|(k, v)| (k.to_ascii_lowercase(), v.to_string()))
                .collect(),
            title: title.map(|t| t.trim().to_string()),
        },
    ))
}

/// Fallback for lines the grammar rejects (unbalanced quotes, junk between
/// attributes): search attributes anywhere, title after the last comma.
fn extinf_lenient(line: &str) -> ExtInf {
    let lower = line.to_ascii_lowercase();
    let attributes = ["tvg-name", "tvg-logo", "group-title"]
        .iter()
        .filter_map(|key| {
            let needle = format!("{}=\"", key);
            let start = lower.find(&needle)? + needle.len();
            let len = line[start..].find('"')?;
            Some((key.to_string(), line[start..start + len].to_string()))
        })
        .collect();
    let title = line.rsplit_once(',').map(|(_, t)| t.trim().to_string());
    ExtInf { attributes, title }
}

fn parse_extinf(line: &str) -> ExtInf {
    match extinf(line) {
        Ok((_, parsed)) => parsed,
        Err(e) => {
            debug!("Lenient EXTINF parse ({}): {}", e, line);
            extinf_lenient(line)
        }
    }
}

/// Display name: the title, unless it is missing or still holds attributes.
fn display_name(title: Option<&str>, tvg_name: &str, number: usize) -> String {
    match title {
        Some(t) if !t.is_empty() && !t.contains("tvg-") && !t.contains("=\"") => t.to_string(),
        _ if !tvg_name.is_empty() => tvg_name.to_string(),
        _ => format!("Channel {}", number),
    }
}

/// Parsed playlist with every category it mentions.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ParsedPlaylist {
    pub channels: Vec<Channel>,
    /// Category to content type of its first channel.
    pub categories: BTreeMap<String, ContentType>,
}

impl ParsedPlaylist {
    /// Channels in `selected` categories. Empty selection keeps everything.
    pub fn filter(&self, selected: &[String]) -> Vec<Channel> {
        if selected.is_empty() {
            return self.channels.clone();
        }
        self.channels
            .iter()
            .filter(|ch| selected.contains(&ch.category))
            .cloned()
            .collect()
    }

    /// Published lineup for a category selection.
    pub fn into_lineup(self, selected: &[String]) -> ChannelLineup {
        let channels = self.filter(selected);
        info!(
            "Publishing {}/{} channels ({} categories selected)",
            channels.len(),
            self.channels.len(),
            selected.len()
        );
        ChannelLineup::new(channels, self.categories)
    }
}

/// Parse playlist text. Entries without a URL are skipped.
pub fn parse_m3u(content: &str) -> ParsedPlaylist {
    let lines: Vec<&str> = content.lines().map(str::trim).collect();
    let mut playlist = ParsedPlaylist::default();

    let mut i = 0;
    while i < lines.len() {
        let line = lines[i];
        i += 1;
        if !line.to_ascii_uppercase().starts_with("#EXTINF") {
            continue;
        }

        let url_at = (i..lines.len().min(i + URL_LOOKAHEAD))
            .find(|&j| !lines[j].is_empty() && !lines[j].starts_with('#'));
        let Some(url_at) = url_at else {
            continue;
        };
        let url = lines[url_at].to_string();
        i = url_at + 1;

        let info = parse_extinf(line);
        let number = playlist.channels.len() + 1;
        let tvg_name = info.attribute("tvg-name").unwrap_or_default().to_string();
        let category = match info.attribute("group-title") {
            Some(group) if !group.trim().is_empty() => group.trim().to_string(),
            _ => UNCATEGORIZED.to_string(),
        };
        let name = display_name(info.title.as_deref(), &tvg_name, number);

        playlist
            .categories
            .entry(category.clone())
            .or_insert_with(|| ContentType::detect(&url));

        playlist.channels.push(Channel {
            id: format!("ch{}", number),
            tvg_name: if tvg_name.is_empty() { name.clone() } else { tvg_name },
            name,
            url,
            category,
            logo: info
                .attribute("tvg-logo")
                .filter(|logo| !logo.is_empty())
                .map(str::to_string),
            guide_number: number.to_string(),
        });
    }

    info!(
        "Parsed {} channels, {} unique categories",
        playlist.channels.len(),
        playlist.categories.len()
    );
    playlist
}
