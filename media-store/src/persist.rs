// SPDX-FileCopyrightText: 2025 2025 Contributors to the Media eXchange Layer project.
// SPDX-License-Identifier: Apache-2.0

//! XML document form of a [`Presentation`].

use std::{
    io::{BufRead, Write},
    path::PathBuf,
};

use quick_xml::{
    Reader, Writer,
    events::{BytesDecl, BytesEnd, BytesStart, Event},
};
use tracing::debug;

use crate::{
    DataProviderRegistry, Error, MediaData, MediaDataRegistry, PcmFormat, Presentation, Result,
    Time, Uid, media::audio::PcmClip,
};

const NAMESPACE: &str = "urn:media-store:presentation:1";

const PRESENTATION: &str = "Presentation";
const PROVIDER_MANAGER: &str = "DataProviderManager";
const PROVIDERS: &str = "DataProviders";
const PROVIDER_ITEM: &str = "DataProviderItem";
const FILE_PROVIDER: &str = "FileDataProvider";
const MEDIA_MANAGER: &str = "MediaDataManager";
const DEFAULT_FORMAT: &str = "DefaultPCMFormat";
const FORMAT_INFO: &str = "PCMFormatInfo";
const MEDIA: &str = "MediaData";
const MEDIA_ITEM: &str = "MediaDataItem";
const AUDIO: &str = "AudioMediaData";
const CLIPS: &str = "PcmClips";
const CLIP: &str = "PcmClip";

pub(crate) fn write_document<W: Write>(presentation: &Presentation, out: W) -> Result<()> {
    let mut writer = Writer::new_with_indent(out, b' ', 2);
    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("utf-8"), None)))?;

    let mut root = BytesStart::new(PRESENTATION);
    root.push_attribute(("xmlns", NAMESPACE));
    writer.write_event(Event::Start(root))?;

    write_providers(&mut writer, presentation.data_provider_registry())?;
    write_media(&mut writer, presentation.media_data_registry())?;

    writer.write_event(Event::End(BytesEnd::new(PRESENTATION)))?;
    Ok(())
}

fn write_providers<W: Write>(writer: &mut Writer<W>, registry: &DataProviderRegistry) -> Result<()> {
    let data_dir = registry.data_directory();
    let mut manager = BytesStart::new(PROVIDER_MANAGER);
    manager.push_attribute(("dataFileDirectoryPath", &*data_dir.to_string_lossy()));
    writer.write_event(Event::Start(manager))?;
    writer.write_event(Event::Start(BytesStart::new(PROVIDERS)))?;

    for (uid, provider) in registry.entries() {
        let mut item = BytesStart::new(PROVIDER_ITEM);
        item.push_attribute(("uid", uid.as_str()));
        writer.write_event(Event::Start(item))?;

        let mut file = BytesStart::new(FILE_PROVIDER);
        file.push_attribute((
            "DataFileRelativePath",
            &*provider.relative_path().to_string_lossy(),
        ));
        file.push_attribute(("MimeType", provider.mime_type()));
        writer.write_event(Event::Empty(file))?;

        writer.write_event(Event::End(BytesEnd::new(PROVIDER_ITEM)))?;
    }

    writer.write_event(Event::End(BytesEnd::new(PROVIDERS)))?;
    writer.write_event(Event::End(BytesEnd::new(PROVIDER_MANAGER)))?;
    Ok(())
}

fn write_media<W: Write>(writer: &mut Writer<W>, registry: &MediaDataRegistry) -> Result<()> {
    let providers = registry.data_provider_registry();
    let mut manager = BytesStart::new(MEDIA_MANAGER);
    let enforce = registry.enforces_single_pcm_format().to_string();
    manager.push_attribute(("enforceSinglePCMFormat", enforce.as_str()));
    writer.write_event(Event::Start(manager))?;

    writer.write_event(Event::Start(BytesStart::new(DEFAULT_FORMAT)))?;
    writer.write_event(Event::Empty(format_element(
        FORMAT_INFO,
        &registry.default_pcm_format(),
    )))?;
    writer.write_event(Event::End(BytesEnd::new(DEFAULT_FORMAT)))?;

    writer.write_event(Event::Start(BytesStart::new(MEDIA)))?;
    for (uid, data) in registry.entries() {
        let MediaData::Audio(audio) = &data;
        let mut item = BytesStart::new(MEDIA_ITEM);
        item.push_attribute(("uid", uid.as_str()));
        writer.write_event(Event::Start(item))?;

        let format = audio.pcm_format();
        let mut element = format_element(AUDIO, &format);
        let name = audio.name();
        element.push_attribute(("name", name.as_str()));
        writer.write_event(Event::Start(element))?;

        writer.write_event(Event::Start(BytesStart::new(CLIPS)))?;
        for clip in audio.clips() {
            let provider_uid = providers.uid_of(&clip.provider)?;
            let begin = format.time_for(clip.begin).to_string();
            let end = format.time_for(clip.end).to_string();
            let mut element = BytesStart::new(CLIP);
            element.push_attribute(("dataProvider", provider_uid.as_str()));
            element.push_attribute(("clipBegin", begin.as_str()));
            element.push_attribute(("clipEnd", end.as_str()));
            writer.write_event(Event::Empty(element))?;
        }
        writer.write_event(Event::End(BytesEnd::new(CLIPS)))?;

        writer.write_event(Event::End(BytesEnd::new(AUDIO)))?;
        writer.write_event(Event::End(BytesEnd::new(MEDIA_ITEM)))?;
    }
    writer.write_event(Event::End(BytesEnd::new(MEDIA)))?;

    writer.write_event(Event::End(BytesEnd::new(MEDIA_MANAGER)))?;
    Ok(())
}

fn format_element<'a>(name: &'a str, format: &PcmFormat) -> BytesStart<'a> {
    let mut element = BytesStart::new(name);
    element.push_attribute(("NumberOfChannels", format.channels().to_string().as_str()));
    element.push_attribute(("BitDepth", format.bit_depth().to_string().as_str()));
    element.push_attribute(("SampleRate", format.sample_rate().to_string().as_str()));
    element
}

/// A parsed element: local name, attributes without namespace declarations,
/// and child elements. Text content is not part of the document format.
#[derive(Debug)]
struct Element {
    name: String,
    attributes: Vec<(String, String)>,
    children: Vec<Element>,
}

impl Element {
    fn from_start(start: &BytesStart<'_>) -> Result<Self> {
        let name = String::from_utf8_lossy(start.local_name().as_ref()).into_owned();
        let mut attributes = Vec::new();
        for attr in start.attributes() {
            let attr = attr?;
            let key = attr.key.as_ref();
            if key == b"xmlns" || key.starts_with(b"xmlns:") {
                continue;
            }
            let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
            let value = attr
                .unescape_value()
                .map_err(|err| Error::Parse(format!("attribute {key} of <{name}>: {err}")))?
                .into_owned();
            attributes.push((key, value));
        }
        Ok(Self {
            name,
            attributes,
            children: Vec::new(),
        })
    }

    fn attr(&self, key: &str) -> Result<&str> {
        self.attributes
            .iter()
            .find(|(name, _)| name == key)
            .map(|(_, value)| value.as_str())
            .ok_or_else(|| Error::Parse(format!("<{}> is missing attribute {key}", self.name)))
    }

    fn parsed_attr<T: std::str::FromStr>(&self, key: &str) -> Result<T>
    where
        T::Err: std::fmt::Display,
    {
        let value = self.attr(key)?;
        value.parse().map_err(|err| {
            Error::Parse(format!("attribute {key}=\"{value}\" of <{}>: {err}", self.name))
        })
    }

    fn child(&self, name: &str) -> Result<&Element> {
        self.children
            .iter()
            .find(|child| child.name == name)
            .ok_or_else(|| Error::Parse(format!("<{}> has no <{name}> child", self.name)))
    }

    fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> + 'a {
        self.children.iter().filter(move |child| child.name == name)
    }
}

fn parse_tree<R: BufRead>(input: R) -> Result<Element> {
    let mut reader = Reader::from_reader(input);
    reader.config_mut().trim_text(true);

    let mut buf = Vec::new();
    let mut stack: Vec<Element> = Vec::new();
    loop {
        match reader.read_event_into(&mut buf)? {
            Event::Start(e) => stack.push(Element::from_start(&e)?),
            Event::Empty(e) => {
                let element = Element::from_start(&e)?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(element),
                    None => return Ok(element),
                }
            }
            Event::End(_) => {
                let element = stack
                    .pop()
                    .ok_or_else(|| Error::Parse("unbalanced closing tag".to_string()))?;
                match stack.last_mut() {
                    Some(parent) => parent.children.push(element),
                    None => return Ok(element),
                }
            }
            Event::Eof => return Err(Error::Parse("document has no root element".to_string())),
            _ => {}
        }
        buf.clear();
    }
}

fn read_format(element: &Element) -> Result<PcmFormat> {
    PcmFormat::new(
        element.parsed_attr("NumberOfChannels")?,
        element.parsed_attr("BitDepth")?,
        element.parsed_attr("SampleRate")?,
    )
}

pub(crate) fn read_document<R: BufRead>(root: PathBuf, input: R) -> Result<Presentation> {
    let document = parse_tree(input)?;
    if document.name != PRESENTATION {
        return Err(Error::Parse(format!(
            "expected <{PRESENTATION}> root, found <{}>",
            document.name
        )));
    }

    let provider_manager = document.child(PROVIDER_MANAGER)?;
    let providers = DataProviderRegistry::new(
        root.clone(),
        provider_manager.attr("dataFileDirectoryPath")?,
    );
    if let Ok(items) = provider_manager.child(PROVIDERS) {
        for item in items.children_named(PROVIDER_ITEM) {
            let uid: Uid = item.parsed_attr("uid")?;
            let file = item.child(FILE_PROVIDER)?;
            let relative_path = PathBuf::from(file.attr("DataFileRelativePath")?);
            let mime_type = file.attr("MimeType")?;
            let provider = providers.restore_provider(uid.clone(), relative_path, mime_type)?;
            if !provider.is_initialized() {
                debug!("Data provider {uid} has no data file yet");
            }
        }
    }

    let media_manager = document.child(MEDIA_MANAGER)?;
    let default_format = read_format(media_manager.child(DEFAULT_FORMAT)?.child(FORMAT_INFO)?)?;
    let enforce: bool = media_manager.parsed_attr("enforceSinglePCMFormat")?;
    let media = MediaDataRegistry::new(providers.clone(), default_format);
    if let Ok(items) = media_manager.child(MEDIA) {
        for item in items.children_named(MEDIA_ITEM) {
            let uid: Uid = item.parsed_attr("uid")?;
            let audio = item.child(AUDIO).map_err(|_| {
                Error::Parse(format!("media data {uid} has no supported content"))
            })?;
            let format = read_format(audio).map_err(|err| in_media(&uid, err))?;
            let name = audio.attr("name").unwrap_or_default().to_string();
            let clips = match audio.child(CLIPS) {
                Ok(clips) => clips
                    .children_named(CLIP)
                    .map(|clip| read_clip(clip, &providers, &format))
                    .collect::<Result<Vec<_>>>()
                    .map_err(|err| in_media(&uid, err))?,
                Err(_) => Vec::new(),
            };
            media.restore_audio(uid, name, format, clips)?;
        }
    }
    media.set_enforce_single_pcm_format(enforce)?;

    Ok(Presentation::from_parts(root, providers, media))
}

/// Prefixes content errors with the media data they were found in.
fn in_media(uid: &Uid, err: Error) -> Error {
    match err {
        Error::Parse(message) => Error::Parse(format!("media data {uid}: {message}")),
        Error::OutOfBounds(message) => Error::OutOfBounds(format!("media data {uid}: {message}")),
        other => other,
    }
}

fn read_clip(
    clip: &Element,
    providers: &DataProviderRegistry,
    format: &PcmFormat,
) -> Result<PcmClip> {
    let provider_uid: Uid = clip.parsed_attr("dataProvider")?;
    let provider = providers.lookup(&provider_uid)?;
    let begin = format.bytes_for(clip.parsed_attr::<Time>("clipBegin")?);
    let end = format.bytes_for(clip.parsed_attr::<Time>("clipEnd")?);
    if end < begin {
        return Err(Error::Parse(format!(
            "clip on provider {provider_uid} ends before it begins"
        )));
    }
    Ok(PcmClip {
        provider,
        begin,
        end,
    })
}
