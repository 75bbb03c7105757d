use std::borrow::Cow;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use smallvec::SmallVec;

use crate::{Error, Result};

/// Maximum number of channels in a [`ChannelLayout`].
pub const MAX_CHANNELS: usize = 24;

/// Physical position of a channel.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
#[non_exhaustive]
pub enum ChannelId {
    FL,
    FR,
    FC,
    LFE,
    RL,
    RR,
    FLC,
    FRC,
    RC,
    SL,
    SR,
    TC,
    TFL,
    TFC,
    TFR,
    TRL,
    TRC,
    TRR,
    RLC,
    RRC,
    FLW,
    FRW,
    FLH,
    FCH,
    FRH,
    TFLC,
    TFRC,
    TSL,
    TSR,
    LLFE,
    RLFE,
    LFE2,
    BC,
    BLC,
    BRC,

    MsMid,
    MsSide,

    AmbisonicW,
    AmbisonicX,
    AmbisonicY,
    AmbisonicZ,

    XyX,
    XyY,

    HeadphonesLeft,
    HeadphonesRight,
    ClickTrack,
    ForeignLanguage,
    HearingImpaired,
    Narration,
    Haptic,
    DialogCentricMix,

    Aux(u32),
}

const NAMED_CHANNELS: [(ChannelId, &str, &str); 51] = [
    (ChannelId::FL, "FL", "Front Left"),
    (ChannelId::FR, "FR", "Front Right"),
    (ChannelId::FC, "FC", "Front Center"),
    (ChannelId::LFE, "LFE", "LFE"),
    (ChannelId::RL, "RL", "Back Left"),
    (ChannelId::RR, "RR", "Back Right"),
    (ChannelId::FLC, "FLC", "Front Left Center"),
    (ChannelId::FRC, "FRC", "Front Right Center"),
    (ChannelId::RC, "RC", "Back Center"),
    (ChannelId::SL, "SL", "Side Left"),
    (ChannelId::SR, "SR", "Side Right"),
    (ChannelId::TC, "TC", "Top Center"),
    (ChannelId::TFL, "TFL", "Top Front Left"),
    (ChannelId::TFC, "TFC", "Top Front Center"),
    (ChannelId::TFR, "TFR", "Top Front Right"),
    (ChannelId::TRL, "TRL", "Top Back Left"),
    (ChannelId::TRC, "TRC", "Top Back Center"),
    (ChannelId::TRR, "TRR", "Top Back Right"),
    (ChannelId::RLC, "RLC", "Back Left Center"),
    (ChannelId::RRC, "RRC", "Back Right Center"),
    (ChannelId::FLW, "FLW", "Front Left Wide"),
    (ChannelId::FRW, "FRW", "Front Right Wide"),
    (ChannelId::FLH, "FLH", "Front Left High"),
    (ChannelId::FCH, "FCH", "Front Center High"),
    (ChannelId::FRH, "FRH", "Front Right High"),
    (ChannelId::TFLC, "TFLC", "Top Front Left Center"),
    (ChannelId::TFRC, "TFRC", "Top Front Right Center"),
    (ChannelId::TSL, "TSL", "Top Side Left"),
    (ChannelId::TSR, "TSR", "Top Side Right"),
    (ChannelId::LLFE, "LLFE", "Left LFE"),
    (ChannelId::RLFE, "RLFE", "Right LFE"),
    (ChannelId::LFE2, "LFE2", "LFE 2"),
    (ChannelId::BC, "BC", "Bottom Center"),
    (ChannelId::BLC, "BLC", "Bottom Left Center"),
    (ChannelId::BRC, "BRC", "Bottom Right Center"),
    (ChannelId::MsMid, "M", "Mid/Side Mid"),
    (ChannelId::MsSide, "S", "Mid/Side Side"),
    (ChannelId::AmbisonicW, "W", "Ambisonic W"),
    (ChannelId::AmbisonicX, "X", "Ambisonic X"),
    (ChannelId::AmbisonicY, "Y", "Ambisonic Y"),
    (ChannelId::AmbisonicZ, "Z", "Ambisonic Z"),
    (ChannelId::XyX, "XY-X", "X-Y X"),
    (ChannelId::XyY, "XY-Y", "X-Y Y"),
    (ChannelId::HeadphonesLeft, "HL", "Headphones Left"),
    (ChannelId::HeadphonesRight, "HR", "Headphones Right"),
    (ChannelId::ClickTrack, "CT", "Click Track"),
    (ChannelId::ForeignLanguage, "FLANG", "Foreign Language"),
    (ChannelId::HearingImpaired, "HI", "Hearing Impaired"),
    (ChannelId::Narration, "NARR", "Narration"),
    (ChannelId::Haptic, "H", "Haptic"),
    (ChannelId::DialogCentricMix, "DCM", "Dialog Centric Mix"),
];

impl ChannelId {
    /// Human readable name, e.g. `"Front Left"`.
    pub fn name(self) -> Cow<'static, str> {
        if let ChannelId::Aux(idx) = self {
            return Cow::Owned(format!("Aux {idx}"));
        }

        NAMED_CHANNELS
            .iter()
            .find(|(id, _, _)| *id == self)
            .map(|&(_, _, name)| Cow::Borrowed(name))
            .unwrap_or(Cow::Borrowed("Unknown"))
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

impl FromStr for ChannelId {
    type Err = Error;

    /// Accepts either the abbreviation (`"FL"`) or the full name (`"front left"`), ignoring case.
    fn from_str(s: &str) -> Result<ChannelId> {
        let s = s.trim();

        if let Some(idx) = s
            .strip_prefix("Aux")
            .or_else(|| s.strip_prefix("aux"))
            .or_else(|| s.strip_prefix("AUX"))
        {
            return idx
                .trim()
                .parse()
                .map(ChannelId::Aux)
                .map_err(|_| Error::invalid("bad aux channel index"));
        }

        NAMED_CHANNELS
            .iter()
            .find(|(_, abbr, name)| abbr.eq_ignore_ascii_case(s) || name.eq_ignore_ascii_case(s))
            .map(|&(id, _, _)| id)
            .ok_or(Error::invalid("unknown channel name"))
    }
}

/// Layouts every backend knows by name.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum BuiltinLayout {
    Mono,
    Stereo,
    L2Point1,
    L3Point0,
    L3Point0Back,
    L3Point1,
    L4Point0,
    Quad,
    QuadSide,
    L4Point1,
    L5Point0Back,
    L5Point0Side,
    L5Point1,
    L5Point1Back,
    L6Point0Side,
    L6Point0Front,
    Hexagonal,
    L6Point1,
    L6Point1Back,
    L6Point1Front,
    L7Point0,
    L7Point0Front,
    L7Point1,
    L7Point1Wide,
    L7Point1WideBack,
    Octagonal,
}

impl BuiltinLayout {
    pub const ALL: [BuiltinLayout; 26] = [
        BuiltinLayout::Mono,
        BuiltinLayout::Stereo,
        BuiltinLayout::L2Point1,
        BuiltinLayout::L3Point0,
        BuiltinLayout::L3Point0Back,
        BuiltinLayout::L3Point1,
        BuiltinLayout::L4Point0,
        BuiltinLayout::Quad,
        BuiltinLayout::QuadSide,
        BuiltinLayout::L4Point1,
        BuiltinLayout::L5Point0Back,
        BuiltinLayout::L5Point0Side,
        BuiltinLayout::L5Point1,
        BuiltinLayout::L5Point1Back,
        BuiltinLayout::L6Point0Side,
        BuiltinLayout::L6Point0Front,
        BuiltinLayout::Hexagonal,
        BuiltinLayout::L6Point1,
        BuiltinLayout::L6Point1Back,
        BuiltinLayout::L6Point1Front,
        BuiltinLayout::L7Point0,
        BuiltinLayout::L7Point0Front,
        BuiltinLayout::L7Point1,
        BuiltinLayout::L7Point1Wide,
        BuiltinLayout::L7Point1WideBack,
        BuiltinLayout::Octagonal,
    ];

    pub fn name(self) -> &'static str {
        use BuiltinLayout::*;
        match self {
            Mono => "Mono",
            Stereo => "Stereo",
            L2Point1 => "2.1",
            L3Point0 => "3.0",
            L3Point0Back => "3.0 (back)",
            L3Point1 => "3.1",
            L4Point0 => "4.0",
            Quad => "Quad",
            QuadSide => "Quad (side)",
            L4Point1 => "4.1",
            L5Point0Back => "5.0 (back)",
            L5Point0Side => "5.0 (side)",
            L5Point1 => "5.1",
            L5Point1Back => "5.1 (back)",
            L6Point0Side => "6.0 (side)",
            L6Point0Front => "6.0 (front)",
            Hexagonal => "Hexagonal",
            L6Point1 => "6.1",
            L6Point1Back => "6.1 (back)",
            L6Point1Front => "6.1 (front)",
            L7Point0 => "7.0",
            L7Point0Front => "7.0 (front)",
            L7Point1 => "7.1",
            L7Point1Wide => "7.1 (wide)",
            L7Point1WideBack => "7.1 (wide) (back)",
            Octagonal => "Octagonal",
        }
    }

    pub fn channels(self) -> &'static [ChannelId] {
        use BuiltinLayout::*;
        use ChannelId::*;
        match self {
            Mono => &[FC],
            Stereo => &[FL, FR],
            L2Point1 => &[FL, FR, LFE],
            L3Point0 => &[FL, FR, FC],
            L3Point0Back => &[FL, FR, RC],
            L3Point1 => &[FL, FR, FC, LFE],
            L4Point0 => &[FL, FR, FC, RC],
            Quad => &[FL, FR, RL, RR],
            QuadSide => &[FL, FR, SL, SR],
            L4Point1 => &[FL, FR, FC, RC, LFE],
            L5Point0Back => &[FL, FR, FC, RL, RR],
            L5Point0Side => &[FL, FR, FC, SL, SR],
            L5Point1 => &[FL, FR, FC, SL, SR, LFE],
            L5Point1Back => &[FL, FR, FC, RL, RR, LFE],
            L6Point0Side => &[FL, FR, FC, SL, SR, RC],
            L6Point0Front => &[FL, FR, SL, SR, FLC, FRC],
            Hexagonal => &[FL, FR, FC, RL, RR, RC],
            L6Point1 => &[FL, FR, FC, SL, SR, RC, LFE],
            L6Point1Back => &[FL, FR, FC, RL, RR, RC, LFE],
            L6Point1Front => &[FL, FR, SL, SR, FLC, FRC, LFE],
            L7Point0 => &[FL, FR, FC, SL, SR, RL, RR],
            L7Point0Front => &[FL, FR, FC, SL, SR, FLC, FRC],
            L7Point1 => &[FL, FR, FC, SL, SR, RL, RR, LFE],
            L7Point1Wide => &[FL, FR, FC, SL, SR, FLC, FRC, LFE],
            L7Point1WideBack => &[FL, FR, FC, RL, RR, FLC, FRC, LFE],
            Octagonal => &[FL, FR, FC, SL, SR, RL, RR, RC],
        }
    }

    pub fn layout(self) -> ChannelLayout {
        ChannelLayout {
            name: Some(Cow::Borrowed(self.name())),
            channels: SmallVec::from_slice(self.channels()),
        }
    }
}

/// Named, ordered set of channel positions.
///
/// Two layouts are equal when their positions match element by element; the name is ignored.
#[derive(Debug, Clone)]
pub struct ChannelLayout {
    name: Option<Cow<'static, str>>,
    channels: SmallVec<[ChannelId; 8]>,
}

impl ChannelLayout {
    pub fn new(channels: &[ChannelId]) -> Result<ChannelLayout> {
        if channels.is_empty() {
            return Err(Error::invalid("channel layout without channels"));
        }

        if channels.len() > MAX_CHANNELS {
            return Err(Error::TooManyChannels);
        }

        Ok(ChannelLayout {
            name: None,
            channels: SmallVec::from_slice(channels),
        })
    }

    pub fn with_name(mut self, name: impl Into<Cow<'static, str>>) -> ChannelLayout {
        self.name = Some(name.into());
        self
    }

    /// The default layout for a channel count, if there is one.
    pub fn default_for(channel_count: usize) -> Option<ChannelLayout> {
        let builtin = match channel_count {
            1 => BuiltinLayout::Mono,
            2 => BuiltinLayout::Stereo,
            3 => BuiltinLayout::L3Point0,
            4 => BuiltinLayout::L4Point0,
            5 => BuiltinLayout::L5Point0Back,
            6 => BuiltinLayout::L5Point1Back,
            7 => BuiltinLayout::L6Point1,
            8 => BuiltinLayout::L7Point1,
            _ => return None,
        };

        Some(builtin.layout())
    }

    pub fn builtin() -> impl Iterator<Item = ChannelLayout> {
        BuiltinLayout::ALL.into_iter().map(BuiltinLayout::layout)
    }

    /// The given name, or the name of the matching built-in layout.
    pub fn name(&self) -> Option<&str> {
        match &self.name {
            Some(name) => Some(name),
            None => self.detect_builtin().map(BuiltinLayout::name),
        }
    }

    pub fn channels(&self) -> &[ChannelId] {
        &self.channels
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Index of `channel` within the layout.
    pub fn find_channel(&self, channel: ChannelId) -> Option<usize> {
        self.channels.iter().position(|&c| c == channel)
    }

    pub fn detect_builtin(&self) -> Option<BuiltinLayout> {
        BuiltinLayout::ALL
            .into_iter()
            .find(|builtin| builtin.channels() == self.channels())
    }

    /// The first of `preferred` that `available` contains.
    pub fn best_matching<'a>(
        preferred: &'a [ChannelLayout],
        available: &[ChannelLayout],
    ) -> Option<&'a ChannelLayout> {
        preferred
            .iter()
            .find(|layout| available.contains(layout))
    }
}

impl PartialEq for ChannelLayout {
    fn eq(&self, other: &Self) -> bool {
        self.channels == other.channels
    }
}

impl Eq for ChannelLayout {}

impl Hash for ChannelLayout {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.channels.hash(state);
    }
}

impl From<BuiltinLayout> for ChannelLayout {
    fn from(builtin: BuiltinLayout) -> ChannelLayout {
        builtin.layout()
    }
}

impl fmt::Display for ChannelLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(name) = self.name() {
            return f.write_str(name);
        }

        for (i, channel) in self.channels.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{channel}")?;
        }

        Ok(())
    }
}

/// Sorts layouts so that the ones with the most channels come first. The sort is stable.
pub fn sort_layouts(layouts: &mut [ChannelLayout]) {
    layouts.sort_by(|a, b| b.channel_count().cmp(&a.channel_count()));
}

/// Outcome of [`select_layout()`].
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct LayoutChoice {
    pub layout: ChannelLayout,
    /// `false` when no advertised layout has the requested channel count, so the samples will
    /// need remixing.
    pub native: bool,
}

/// Picks the first advertised layout with exactly `channel_count` channels, falling back to the
/// first advertised layout.
pub fn select_layout(layouts: &[ChannelLayout], channel_count: usize) -> Result<LayoutChoice> {
    if let Some(layout) = layouts
        .iter()
        .find(|layout| layout.channel_count() == channel_count)
    {
        return Ok(LayoutChoice {
            layout: layout.clone(),
            native: true,
        });
    }

    let layout = layouts.first().ok_or(Error::NoCompatibleLayout)?;

    Ok(LayoutChoice {
        layout: layout.clone(),
        native: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mono_stereo() -> Vec<ChannelLayout> {
        vec![BuiltinLayout::Mono.layout(), BuiltinLayout::Stereo.layout()]
    }

    #[test]
    fn selects_exact_channel_count() {
        let choice = select_layout(&mono_stereo(), 2).unwrap();
        assert!(choice.native);
        assert_eq!(choice.layout, BuiltinLayout::Stereo.layout());

        let choice = select_layout(&mono_stereo(), 1).unwrap();
        assert!(choice.native);
        assert_eq!(choice.layout.channel_count(), 1);
    }

    #[test]
    fn falls_back_to_first_layout() {
        let choice = select_layout(&mono_stereo(), 6).unwrap();
        assert!(!choice.native);
        assert_eq!(choice.layout, BuiltinLayout::Mono.layout());
    }

    #[test]
    fn fails_without_layouts() {
        assert_eq!(select_layout(&[], 2), Err(Error::NoCompatibleLayout));
    }

    #[test]
    fn equality_ignores_name() {
        let custom = ChannelLayout::new(&[ChannelId::FL, ChannelId::FR])
            .unwrap()
            .with_name("my stereo");
        assert_eq!(custom, BuiltinLayout::Stereo.layout());
        assert_eq!(custom.name(), Some("my stereo"));

        let swapped = ChannelLayout::new(&[ChannelId::FR, ChannelId::FL]).unwrap();
        assert_ne!(swapped, BuiltinLayout::Stereo.layout());
        assert_eq!(swapped.name(), None);
        assert_eq!(swapped.to_string(), "Front Right, Front Left");
    }

    #[test]
    fn rejects_oversized_layouts() {
        let channels: Vec<_> = (0..25).map(ChannelId::Aux).collect();
        assert_eq!(ChannelLayout::new(&channels), Err(Error::TooManyChannels));
        assert!(ChannelLayout::new(&channels[..24]).is_ok());
        assert!(ChannelLayout::new(&[]).is_err());
    }

    #[test]
    fn detects_builtin_layouts() {
        for builtin in BuiltinLayout::ALL {
            let layout = ChannelLayout::new(builtin.channels()).unwrap();
            assert_eq!(layout.detect_builtin(), Some(builtin));
            assert_eq!(layout.name(), Some(builtin.name()));
        }
    }

    #[test]
    fn default_layouts_have_requested_count() {
        for count in 1..=8 {
            let layout = ChannelLayout::default_for(count).unwrap();
            assert_eq!(layout.channel_count(), count);
        }
        assert!(ChannelLayout::default_for(9).is_none());
        assert!(ChannelLayout::default_for(0).is_none());
    }

    #[test]
    fn finds_channels() {
        let layout = BuiltinLayout::L5Point1.layout();
        assert_eq!(layout.find_channel(ChannelId::LFE), Some(5));
        assert_eq!(layout.find_channel(ChannelId::RC), None);
    }

    #[test]
    fn best_matching_prefers_caller_order() {
        let preferred = [
            BuiltinLayout::L5Point1.layout(),
            BuiltinLayout::Stereo.layout(),
            BuiltinLayout::Mono.layout(),
        ];
        let best = ChannelLayout::best_matching(&preferred, &mono_stereo());
        assert_eq!(best, Some(&preferred[1]));

        let none = ChannelLayout::best_matching(&preferred[..1], &mono_stereo());
        assert_eq!(none, None);
    }

    #[test]
    fn sorting_puts_widest_first() {
        let mut layouts = mono_stereo();
        layouts.push(BuiltinLayout::L7Point1.layout());
        sort_layouts(&mut layouts);

        let counts: Vec<_> = layouts.iter().map(ChannelLayout::channel_count).collect();
        assert_eq!(counts, [8, 2, 1]);
    }

    #[test]
    fn parses_channel_names() {
        assert_eq!("FL".parse(), Ok(ChannelId::FL));
        assert_eq!("front right".parse(), Ok(ChannelId::FR));
        assert_eq!("Aux 3".parse(), Ok(ChannelId::Aux(3)));
        assert!("sideways".parse::<ChannelId>().is_err());
        assert_eq!(ChannelId::Aux(7).to_string(), "Aux 7");
    }
}
