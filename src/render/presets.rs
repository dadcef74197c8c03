//! Compression presets 1 (slowest, best quality) to 10 (fastest).
//!
//! Each preset level expands to a bundle of encoder-specific tuning options.
//! The tables are plain constant data keyed by codec family, preset level and
//! the role of the pass being encoded.

/// Encoder families sharing one tuning vocabulary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecFamily {
    /// libx264, tuned through `x264-params`
    X264,
    /// libavcodec's native MPEG-style encoders (mpeg4, mpeg2video, ...)
    Mpeg,
    /// libvpx VP8/VP9
    Vpx,
    /// Anything else; encoder defaults are used
    Other,
}

impl CodecFamily {
    pub fn of(codec: &str) -> Self {
        match codec {
            "libx264" | "libx264rgb" => Self::X264,
            "mpeg4" | "mpeg2video" | "mpeg1video" | "msmpeg4" | "msmpeg4v2" | "h263p" | "flv" => Self::Mpeg,
            name if name.starts_with("libvpx") => Self::Vpx,
            _ => Self::Other,
        }
    }
}

/// Role of the pass the options are generated for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassRole {
    /// One-pass encode
    Single,
    /// First pass of two: collects rate-control statistics
    Analyze,
    /// Second pass of two: consumes the statistics
    Final,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct X264Tuning {
    me: &'static str,
    subme: u8,
    merange: u8,
    bframes: u8,
    refs: u8,
    trellis: u8,
    rc_lookahead: Option<u8>,
    b_adapt: u8,
    direct: &'static str,
    weightp: u8,
    partitions: &'static str,
    mixed_refs: bool,
    dct8x8: bool,
    fast_pskip: bool,
    mbtree: bool,
    fast: bool,
}

const fn x264(
    me: &'static str,
    subme: u8,
    merange: u8,
    bframes: u8,
    refs: u8,
    trellis: u8,
    rc_lookahead: Option<u8>,
    b_adapt: u8,
    direct: &'static str,
    weightp: u8,
    partitions: &'static str,
    mixed_refs: bool,
    dct8x8: bool,
    fast_pskip: bool,
    mbtree: bool,
) -> X264Tuning {
    X264Tuning {
        me,
        subme,
        merange,
        bframes,
        refs,
        trellis,
        rc_lookahead,
        b_adapt,
        direct,
        weightp,
        partitions,
        mixed_refs,
        dct8x8,
        fast_pskip,
        mbtree,
        fast: false,
    }
}

const ALL_PARTITIONS: &str = "all";
const NO_P4X4: &str = "i8x8,i4x4,p8x8,b8x8";
const INTRA_ONLY: &str = "i8x8,i4x4";
const NO_PARTITIONS: &str = "none";

/// Preset 10: no CABAC, no deblocking, no AQ, no scene-cut detection
const X264_FASTEST: X264Tuning = X264Tuning {
    fast: true,
    ..x264("dia", 0, 16, 0, 1, 0, Some(0), 0, "spatial", 0, NO_PARTITIONS, false, false, true, false)
};

/// Single-pass and final-pass tuning
const X264_QUALITY: [X264Tuning; 10] = [
    x264("tesa", 10, 24, 16, 16, 2, Some(60), 2, "auto", 2, ALL_PARTITIONS, true, true, false, true),
    x264("umh", 10, 24, 8, 16, 2, Some(60), 2, "auto", 2, ALL_PARTITIONS, true, true, true, true),
    x264("umh", 9, 16, 3, 8, 2, Some(60), 2, "auto", 2, ALL_PARTITIONS, true, true, true, true),
    x264("umh", 8, 16, 3, 5, 1, Some(50), 2, "auto", 2, NO_P4X4, true, true, true, true),
    x264("hex", 7, 16, 3, 3, 1, None, 1, "spatial", 2, NO_P4X4, true, true, true, true),
    x264("hex", 6, 16, 3, 2, 1, Some(30), 1, "spatial", 2, NO_P4X4, true, true, true, true),
    x264("hex", 4, 16, 3, 2, 1, Some(20), 1, "spatial", 1, NO_P4X4, false, true, true, true),
    x264("hex", 2, 16, 3, 1, 0, Some(10), 1, "spatial", 0, NO_P4X4, false, true, true, true),
    x264("dia", 1, 16, 3, 1, 0, Some(0), 1, "spatial", 0, INTRA_ONLY, false, true, true, false),
    X264_FASTEST,
];

/// Fast first-pass tuning; only the statistics matter, so analysis is cheap
const X264_ANALYSIS: [X264Tuning; 10] = [
    x264("tesa", 10, 24, 16, 16, 2, Some(60), 2, "auto", 2, ALL_PARTITIONS, true, true, false, true),
    x264("dia", 2, 24, 8, 1, 0, Some(60), 2, "auto", 2, NO_PARTITIONS, false, false, true, true),
    x264("dia", 2, 16, 3, 1, 0, Some(60), 2, "auto", 2, NO_PARTITIONS, false, false, true, true),
    x264("dia", 2, 16, 3, 1, 0, Some(50), 2, "auto", 2, NO_PARTITIONS, false, false, true, true),
    x264("dia", 2, 16, 3, 1, 0, None, 1, "spatial", 2, NO_PARTITIONS, false, false, true, true),
    x264("dia", 2, 16, 3, 1, 0, Some(30), 1, "spatial", 2, NO_PARTITIONS, false, false, true, true),
    x264("dia", 2, 16, 3, 1, 0, Some(20), 1, "spatial", 1, NO_PARTITIONS, false, false, true, true),
    x264("dia", 2, 16, 3, 1, 0, Some(10), 1, "spatial", 0, NO_PARTITIONS, false, false, true, true),
    x264("dia", 1, 16, 3, 1, 0, Some(0), 1, "spatial", 0, NO_PARTITIONS, false, false, true, false),
    X264_FASTEST,
];

fn flag(value: bool) -> u8 {
    value as u8
}

impl X264Tuning {
    fn params(&self) -> String {
        let mut params = vec![
            format!("me={}", self.me),
            format!("subme={}", self.subme),
            format!("merange={}", self.merange),
            format!("bframes={}", self.bframes),
            format!("ref={}", self.refs),
            format!("trellis={}", self.trellis),
            format!("b-adapt={}", self.b_adapt),
            format!("direct={}", self.direct),
            format!("weightp={}", self.weightp),
            format!("partitions={}", self.partitions),
            format!("mixed-refs={}", flag(self.mixed_refs)),
            format!("8x8dct={}", flag(self.dct8x8)),
            format!("fast-pskip={}", flag(self.fast_pskip)),
            format!("mbtree={}", flag(self.mbtree)),
            "min-keyint=25".to_string(),
            "qpmin=10".to_string(),
            "qpmax=51".to_string(),
            "qpstep=4".to_string(),
            "qcomp=0.6".to_string(),
            "ipratio=1.41".to_string(),
        ];

        if let Some(lookahead) = self.rc_lookahead {
            params.push(format!("rc-lookahead={}", lookahead));
        }

        if self.fast {
            params.extend(
                ["cabac=0", "no-deblock=1", "aq-mode=0", "scenecut=0", "weightb=0", "b-pyramid=none"]
                    .iter()
                    .map(|s| s.to_string()),
            );
        } else {
            params.extend(["scenecut=40", "weightb=1", "b-pyramid=normal"].iter().map(|s| s.to_string()));
        }

        params.join(":")
    }
}

fn level_index(preset: u8) -> usize {
    preset.clamp(1, 10) as usize - 1
}

/// Encoder options (AVOption name, value) for a preset level
pub fn encoder_options(codec: &str, preset: u8, role: PassRole) -> Vec<(String, String)> {
    let level = level_index(preset);

    match CodecFamily::of(codec) {
        CodecFamily::X264 => {
            let table = if role == PassRole::Analyze { &X264_ANALYSIS } else { &X264_QUALITY };
            vec![("x264-params".to_string(), table[level].params())]
        }
        CodecFamily::Mpeg => {
            let preset = level + 1;
            let mbd = match preset {
                1..=3 => "rd",
                4..=7 => "bits",
                _ => "simple",
            };
            let bf = if preset == 10 { 0 } else { 2 };
            let trellis = if preset <= 4 { 1 } else { 0 };
            let me_range = if preset <= 2 { 24 } else { 16 };

            let mut options = vec![
                ("mbd".to_string(), mbd.to_string()),
                ("bf".to_string(), bf.to_string()),
                ("trellis".to_string(), trellis.to_string()),
                ("me_range".to_string(), me_range.to_string()),
            ];
            if preset <= 5 {
                options.push(("flags".to_string(), "+mv4".to_string()));
            }
            options
        }
        CodecFamily::Vpx => {
            let preset = level as u8 + 1;
            let cpu_used = if role == PassRole::Analyze { 4.max(preset / 2) } else { preset / 2 };
            let deadline = if preset >= 9 { "realtime" } else { "good" };
            let lag = match preset {
                1..=4 => 25,
                5..=7 => 16,
                _ => 0,
            };

            vec![
                ("cpu-used".to_string(), cpu_used.to_string()),
                ("deadline".to_string(), deadline.to_string()),
                ("lag-in-frames".to_string(), lag.to_string()),
            ]
        }
        CodecFamily::Other => Vec::new(),
    }
}
