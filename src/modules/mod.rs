//! The analysis module set.
//!
//! Every module turns a track's chunk list into one `ModuleEntry` covering
//! the full chunk x band grid. Band-aware modules use the shared band plan;
//! full-spectrum modules use the single synthetic "full" band. Derived
//! modules read earlier modules' results out of the in-progress document
//! instead of (or in addition to) the audio.

pub mod audio;
pub mod derived;
pub mod dsp;
pub mod dynamics;
pub mod freq_response;
pub mod harmonics;
pub mod quantization;
pub mod sparkle;
pub mod stereo;

use std::path::PathBuf;

use thiserror::Error;

use crate::bands::{BandPlan, FULL_SPECTRUM};
use crate::config::AppConfig;
use crate::cube::{MetricsDocument, ModuleEntry};

#[derive(Error, Debug)]
pub enum ModuleError {
    #[error("module {module} needs results from {dependency}, which are not present")]
    MissingDependency {
        module: &'static str,
        dependency: &'static str,
    },
    #[error("module {module}: {dependency} results do not cover the current chunk/band grid")]
    DependencyShape {
        module: &'static str,
        dependency: &'static str,
    },
}

/// Everything a module needs to run against one track.
pub struct ModuleContext<'a> {
    /// Chunk WAV files in time order.
    pub chunks: &'a [PathBuf],
    pub band_plan: &'a BandPlan,
    pub config: &'a AppConfig,
    /// The document as merged so far this run; derived modules read their
    /// dependencies from here.
    pub document: &'a MetricsDocument,
}

impl ModuleContext<'_> {
    /// Band labels for a band-aware module.
    pub fn band_labels(&self) -> Vec<String> {
        self.band_plan.labels()
    }

    /// The single-label band axis for full-spectrum modules.
    pub fn full_spectrum_labels(&self) -> Vec<String> {
        vec![FULL_SPECTRUM.to_string()]
    }
}

/// All analysis modules, in pipeline order. Derived modules come after
/// everything they depend on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnalysisModule {
    StereoWidth,
    StereoCorrelation,
    StereoPhase,
    Sparkle,
    Harmonics,
    HarmonicsFullSpectrum,
    FreqResponse,
    Dynamics,
    DynamicsFullSpectrum,
    Quantization,
    QuantizationFullSpectrum,
    DynamicRange,
    AudioQuality,
}

/// Execution order. `DynamicRange` and `AudioQuality` must come after the
/// modules they read from.
pub const MODULE_ORDER: [AnalysisModule; 13] = [
    AnalysisModule::StereoWidth,
    AnalysisModule::StereoCorrelation,
    AnalysisModule::StereoPhase,
    AnalysisModule::Sparkle,
    AnalysisModule::Harmonics,
    AnalysisModule::HarmonicsFullSpectrum,
    AnalysisModule::FreqResponse,
    AnalysisModule::Dynamics,
    AnalysisModule::DynamicsFullSpectrum,
    AnalysisModule::Quantization,
    AnalysisModule::QuantizationFullSpectrum,
    AnalysisModule::DynamicRange,
    AnalysisModule::AudioQuality,
];

impl AnalysisModule {
    pub fn name(&self) -> &'static str {
        match self {
            Self::StereoWidth => "stereo_width",
            Self::StereoCorrelation => "stereo_correlation",
            Self::StereoPhase => "stereo_phase",
            Self::Sparkle => "sparkle",
            Self::Harmonics => "harmonics",
            Self::HarmonicsFullSpectrum => "harmonics_full_spectrum",
            Self::FreqResponse => "freq_response",
            Self::Dynamics => "dynamics",
            Self::DynamicsFullSpectrum => "dynamics_full_spectrum",
            Self::Quantization => "quantization",
            Self::QuantizationFullSpectrum => "quantization_full_spectrum",
            Self::DynamicRange => "dynamic_range",
            Self::AudioQuality => "audio_quality",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        MODULE_ORDER.iter().find(|m| m.name() == name).copied()
    }

    /// Whether this module analyzes the unfiltered signal (band axis is the
    /// single "full" label).
    pub fn is_full_spectrum(&self) -> bool {
        matches!(
            self,
            Self::HarmonicsFullSpectrum
                | Self::DynamicsFullSpectrum
                | Self::QuantizationFullSpectrum
        )
    }

    pub fn run(&self, ctx: &ModuleContext) -> Result<ModuleEntry, ModuleError> {
        match self {
            Self::StereoWidth => Ok(stereo::width(ctx)),
            Self::StereoCorrelation => Ok(stereo::correlation(ctx)),
            Self::StereoPhase => Ok(stereo::phase(ctx)),
            Self::Sparkle => Ok(sparkle::run(ctx)),
            Self::Harmonics => Ok(harmonics::banded(ctx)),
            Self::HarmonicsFullSpectrum => Ok(harmonics::full_spectrum(ctx)),
            Self::FreqResponse => Ok(freq_response::run(ctx)),
            Self::Dynamics => Ok(dynamics::banded(ctx)),
            Self::DynamicsFullSpectrum => Ok(dynamics::full_spectrum(ctx)),
            Self::Quantization => Ok(quantization::banded(ctx)),
            Self::QuantizationFullSpectrum => Ok(quantization::full_spectrum(ctx)),
            Self::DynamicRange => derived::dynamic_range(ctx),
            Self::AudioQuality => derived::audio_quality(ctx),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_names_round_trip() {
        for module in MODULE_ORDER {
            assert_eq!(AnalysisModule::from_name(module.name()), Some(module));
        }
        assert_eq!(AnalysisModule::from_name("no_such_module"), None);
    }

    #[test]
    fn test_derived_modules_come_last() {
        let pos = |m: AnalysisModule| MODULE_ORDER.iter().position(|x| *x == m).unwrap();
        assert!(pos(AnalysisModule::DynamicRange) > pos(AnalysisModule::Quantization));
        assert!(pos(AnalysisModule::DynamicRange) > pos(AnalysisModule::DynamicsFullSpectrum));
        assert!(pos(AnalysisModule::AudioQuality) > pos(AnalysisModule::Quantization));
        assert!(pos(AnalysisModule::AudioQuality) > pos(AnalysisModule::HarmonicsFullSpectrum));
    }

    #[test]
    fn test_full_spectrum_flags() {
        assert!(AnalysisModule::HarmonicsFullSpectrum.is_full_spectrum());
        assert!(!AnalysisModule::Harmonics.is_full_spectrum());
        assert!(!AnalysisModule::AudioQuality.is_full_spectrum());
    }
}
