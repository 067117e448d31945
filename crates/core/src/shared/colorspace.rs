use serde::{Deserialize, Serialize};

/// YUV matrix coefficients for video output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ColorSpace {
    #[default]
    Auto,
    Bt601,
    Bt709,
    Smpte240m,
    Rgb,
    Ycgco,
    Bt2020Ncl,
    Bt2020Cl,
}

/// Sample value range for video output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorLevels {
    #[default]
    Auto,
    Limited,
    Full,
}

impl std::fmt::Display for ColorSpace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ColorSpace::Auto => "auto",
            ColorSpace::Bt601 => "bt.601",
            ColorSpace::Bt709 => "bt.709",
            ColorSpace::Smpte240m => "smpte-240m",
            ColorSpace::Rgb => "rgb",
            ColorSpace::Ycgco => "ycgco",
            ColorSpace::Bt2020Ncl => "bt.2020-ncl",
            ColorSpace::Bt2020Cl => "bt.2020-cl",
        };
        write!(f, "{name}")
    }
}

impl std::fmt::Display for ColorLevels {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ColorLevels::Auto => write!(f, "auto"),
            ColorLevels::Limited => write!(f, "limited"),
            ColorLevels::Full => write!(f, "full"),
        }
    }
}
