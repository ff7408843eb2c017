// src/workflow/shape.rs

//! Fixed pipeline shapes selected by case number.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CaseShape {
    /// 1: analysis from an external dataset.
    Analysis,
    /// 2: forecast from an existing analysis.
    ForecastFromAnalysis,
    /// 3: analysis followed by a forecast.
    AnalysisAndForecast,
    /// 4: analysis on top of an earlier cycle.
    CycledAnalysis,
    /// 5: forecast on top of an earlier cycle.
    CycledForecast,
    /// 6 and 7: forecast launched after a series of analysis cycles.
    ForecastAfterCycles,
    /// 27: hybrid gain with an external ensemble.
    HybridGain,
}

const ANALYSIS: &[&str] = &[
    "ungrib", "geogrid", "metgrid", "tinterp", "real", "wrf", "radremap", "news3dvar", "nclplt",
    "unipost", "wrfhybrid",
];
const FORECAST_FROM_ANALYSIS: &[&str] =
    &["metgrid", "real", "wrfdaupdate", "wrf", "nclplt", "unipost"];
const ANALYSIS_AND_FORECAST: &[&str] = &[
    "ungrib", "geogrid", "metgrid", "tinterp", "real", "radremap", "news3dvar", "enrelax",
    "wrfdaupdate", "wrf", "nclplt", "unipost",
];
const CYCLED_ANALYSIS: &[&str] = &[
    "ungrib", "metgrid", "real", "radremap", "news3dvar", "enrelax", "nclplt", "unipost",
    "wrfhybrid",
];
const CYCLED_FORECAST: &[&str] = &["ungrib", "metgrid", "real", "wrfdaupdate", "wrf", "nclplt", "unipost"];
const FORECAST_AFTER_CYCLES: &[&str] =
    &["ungrib", "metgrid", "real", "wrfdaupdate", "wrf", "nclplt", "joinwrf"];
// The hybrid-gain step runs before and after the analysis.
const HYBRID_GAIN: &[&str] = &["wrfhybrid", "radremap", "news3dvar", "wrfhybrid", "nclplt", "unipost"];

impl CaseShape {
    pub fn from_number(number: u32) -> Option<Self> {
        Some(match number {
            1 => CaseShape::Analysis,
            2 => CaseShape::ForecastFromAnalysis,
            3 => CaseShape::AnalysisAndForecast,
            4 => CaseShape::CycledAnalysis,
            5 => CaseShape::CycledForecast,
            6 | 7 => CaseShape::ForecastAfterCycles,
            27 => CaseShape::HybridGain,
            _ => return None,
        })
    }

    /// Ordered step (program) names.
    pub fn steps(self) -> &'static [&'static str] {
        match self {
            CaseShape::Analysis => ANALYSIS,
            CaseShape::ForecastFromAnalysis => FORECAST_FROM_ANALYSIS,
            CaseShape::AnalysisAndForecast => ANALYSIS_AND_FORECAST,
            CaseShape::CycledAnalysis => CYCLED_ANALYSIS,
            CaseShape::CycledForecast => CYCLED_FORECAST,
            CaseShape::ForecastAfterCycles => FORECAST_AFTER_CYCLES,
            CaseShape::HybridGain => HYBRID_GAIN,
        }
    }

    pub fn has_step(self, step: &str) -> bool {
        self.steps().contains(&step)
    }

    /// Suffix of working directory names (`real<n>`) for a case number.
    pub fn dir_index(number: u32) -> u32 {
        match number {
            6 | 7 => 5,
            27 => 7,
            n => n,
        }
    }
}

impl fmt::Display for CaseShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CaseShape::Analysis => "analysis",
            CaseShape::ForecastFromAnalysis => "forecast from analysis",
            CaseShape::AnalysisAndForecast => "analysis and forecast",
            CaseShape::CycledAnalysis => "cycled analysis",
            CaseShape::CycledForecast => "cycled forecast",
            CaseShape::ForecastAfterCycles => "forecast after cycles",
            CaseShape::HybridGain => "hybrid gain",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numbers_map_to_shapes() {
        assert_eq!(CaseShape::from_number(3), Some(CaseShape::AnalysisAndForecast));
        assert_eq!(CaseShape::from_number(7), Some(CaseShape::ForecastAfterCycles));
        assert_eq!(CaseShape::from_number(27), Some(CaseShape::HybridGain));
        assert_eq!(CaseShape::from_number(8), None);
    }

    #[test]
    fn analysis_runs_news3dvar_after_radremap() {
        let steps = CaseShape::Analysis.steps();
        let radremap = steps.iter().position(|s| *s == "radremap").unwrap();
        let news3dvar = steps.iter().position(|s| *s == "news3dvar").unwrap();
        assert!(radremap < news3dvar);
        assert!(!CaseShape::ForecastFromAnalysis.has_step("news3dvar"));
    }

    #[test]
    fn directory_index() {
        assert_eq!(CaseShape::dir_index(3), 3);
        assert_eq!(CaseShape::dir_index(6), 5);
        assert_eq!(CaseShape::dir_index(27), 7);
    }
}
