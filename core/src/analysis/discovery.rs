use crate::analysis::curve::PerformanceCurve;
use crate::analysis::threshold::Threshold;
use crate::campaign::storage::{create_new, read_statistics};
use crate::prelude::{SenseResult, StatisticVector, StimulusLevel};
use crate::telemetry::log::LogManager;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

const OFF_SUFFIX: &str = "_off.dat";

/// Calibration targets used when turning statistics into a Pinmin figure.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AnalysisParams {
    pub pfa: f64,
    pub target_pd: f64,
    /// Fixed path loss between generator output and receiver input.
    pub attenuation_db: f64,
}

impl Default for AnalysisParams {
    fn default() -> Self {
        Self {
            pfa: 0.1,
            target_pd: 0.9,
            attenuation_db: 30.0,
        }
    }
}

/// Statistic files of one (campaign, detector) found on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoveredCampaign {
    /// File-name prefix shared by every level, detector included.
    pub prefix: String,
    pub off_path: PathBuf,
    pub levels: Vec<(StimulusLevel, PathBuf)>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CampaignAnalysis {
    pub campaign: String,
    pub threshold: Threshold,
    pub curve: PerformanceCurve,
    pub pinmin: f64,
}

/// Finds every `*_off.dat` under `dir` and the level files sharing its prefix.
pub fn discover_campaigns(dir: &Path) -> SenseResult<Vec<DiscoveredCampaign>> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_type()?.is_file() {
            if let Some(name) = entry.file_name().to_str() {
                names.push(name.to_string());
            }
        }
    }
    names.sort();

    let mut campaigns = Vec::new();
    for off_name in names.iter().filter(|name| name.ends_with(OFF_SUFFIX)) {
        let prefix = &off_name[..off_name.len() - OFF_SUFFIX.len()];
        let head = format!("{}_", prefix);

        let mut levels: Vec<(StimulusLevel, PathBuf)> = names
            .iter()
            .filter_map(|name| {
                let token = name.strip_prefix(&head)?.strip_suffix(".dat")?;
                let level = StimulusLevel::parse_token(token)?;
                (!level.is_off()).then(|| (level, dir.join(name)))
            })
            .collect();
        levels.sort_by(|a, b| {
            let power = |level: &StimulusLevel| level.receiver_power(0.0).unwrap_or(f64::NAN);
            power(&a.0).total_cmp(&power(&b.0))
        });

        campaigns.push(DiscoveredCampaign {
            prefix: prefix.to_string(),
            off_path: dir.join(off_name),
            levels,
        });
    }
    Ok(campaigns)
}

/// Threshold, curve and Pinmin of one discovered campaign.
pub fn analyze_campaign(
    campaign: &DiscoveredCampaign,
    params: &AnalysisParams,
) -> SenseResult<CampaignAnalysis> {
    let noise = read_statistics(&campaign.off_path)?;
    let threshold = Threshold::from_values(&campaign.prefix, &noise, params.pfa)?;

    let mut levels = Vec::with_capacity(campaign.levels.len());
    for (level, path) in &campaign.levels {
        levels.push((*level, read_statistics(path)?));
    }
    let curve = PerformanceCurve::build(
        &threshold,
        levels.iter().map(|(level, values)| (*level, values.as_slice())),
        params.attenuation_db,
    );
    let pinmin = curve.pinmin(params.target_pd);

    Ok(CampaignAnalysis {
        campaign: format!("{}_*.dat", campaign.prefix),
        threshold,
        curve,
        pinmin,
    })
}

/// Analyzes every campaign found in `dir`.
pub fn analyze_directory(dir: &Path, params: &AnalysisParams) -> SenseResult<Vec<CampaignAnalysis>> {
    let logger = LogManager::new("analysis");
    let campaigns = discover_campaigns(dir)?;
    logger.record(&format!(
        "{} campaigns under {}",
        campaigns.len(),
        dir.display()
    ));

    let mut analyses = Vec::with_capacity(campaigns.len());
    for campaign in &campaigns {
        let analysis = analyze_campaign(campaign, params)?;
        logger.detail(&format!(
            "{}: gamma0 {:.6e}, {} points, pinmin {:.2}",
            analysis.campaign,
            analysis.threshold.gamma0(),
            analysis.curve.points().len(),
            analysis.pinmin
        ));
        analyses.push(analysis);
    }
    Ok(analyses)
}

/// Analyzes in-memory campaign output, one entry per detector with an `Off` vector.
pub fn analyze_vectors(
    vectors: &[StatisticVector],
    params: &AnalysisParams,
) -> SenseResult<Vec<CampaignAnalysis>> {
    let mut analyses = Vec::new();
    for off in vectors.iter().filter(|vector| vector.level().is_off()) {
        let threshold = Threshold::calibrate(off, params.pfa)?;
        let curve = PerformanceCurve::from_vectors(&threshold, vectors, params.attenuation_db);
        let pinmin = curve.pinmin(params.target_pd);
        analyses.push(CampaignAnalysis {
            campaign: off.detector().to_string(),
            threshold,
            curve,
            pinmin,
        });
    }
    Ok(analyses)
}

/// Writes `campaign<TAB>pinmin` lines; an existing report is never replaced.
pub fn write_report(path: &Path, analyses: &[CampaignAnalysis]) -> SenseResult<()> {
    let mut writer = BufWriter::new(create_new(path)?);
    for analysis in analyses {
        writeln!(writer, "{}\t{:.2}", analysis.campaign, analysis.pinmin)?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prelude::SenseError;
    use tempfile::tempdir;

    fn write_values(dir: &Path, name: &str, values: &[f64]) {
        let body: String = values.iter().map(|v| format!("{:e}\n", v)).collect();
        fs::write(dir.join(name), body).unwrap();
    }

    fn noise() -> Vec<f64> {
        (1..=10).map(f64::from).collect()
    }

    fn with_pd(pd: f64) -> Vec<f64> {
        let above = (pd * 10.0).round() as usize;
        (0..10).map(|i| if i < above { 50.0 } else { 0.0 }).collect()
    }

    #[test]
    fn campaigns_are_grouped_by_off_prefix() {
        let dir = tempdir().unwrap();
        let prefix = "sim_tone_fs1_0mhz_ns256";
        write_values(dir.path(), &format!("{}_ed_off.dat", prefix), &noise());
        write_values(dir.path(), &format!("{}_ed_m70_0dbm.dat", prefix), &with_pd(1.0));
        write_values(dir.path(), &format!("{}_ed_m80_0dbm.dat", prefix), &with_pd(0.2));
        write_values(dir.path(), &format!("{}_cav_l10_off.dat", prefix), &noise());
        write_values(dir.path(), &format!("{}_cav_l10_nc_m70_0dbm.dat", prefix), &with_pd(1.0));
        fs::write(dir.path().join(format!("{}_summary.json", prefix)), "{}").unwrap();

        let campaigns = discover_campaigns(dir.path()).unwrap();
        assert_eq!(campaigns.len(), 2);
        assert_eq!(campaigns[0].prefix, format!("{}_cav_l10", prefix));
        // the compensated detector's files are not cav_l10 levels
        assert!(campaigns[0].levels.is_empty());
        assert_eq!(
            campaigns[1]
                .levels
                .iter()
                .map(|(level, _)| *level)
                .collect::<Vec<_>>(),
            vec![
                StimulusLevel::Power { dbm: -80.0 },
                StimulusLevel::Power { dbm: -70.0 }
            ]
        );
    }

    #[test]
    fn directory_analysis_writes_tab_separated_report() {
        let dir = tempdir().unwrap();
        write_values(dir.path(), "a_ed_off.dat", &noise());
        write_values(dir.path(), "a_ed_m80_0dbm.dat", &with_pd(0.2));
        write_values(dir.path(), "a_ed_m76_0dbm.dat", &with_pd(0.6));
        write_values(dir.path(), "a_ed_m72_0dbm.dat", &with_pd(1.0));

        let analyses = analyze_directory(dir.path(), &AnalysisParams::default()).unwrap();
        assert_eq!(analyses.len(), 1);
        assert_eq!(analyses[0].campaign, "a_ed_*.dat");
        assert!((analyses[0].pinmin - (-103.0)).abs() < 1e-9);

        let report = dir.path().join("pinmin.tsv");
        write_report(&report, &analyses).unwrap();
        let text = fs::read_to_string(&report).unwrap();
        assert_eq!(text, "a_ed_*.dat\t-103.00\n");

        assert!(matches!(
            write_report(&report, &analyses),
            Err(SenseError::OutputCollision(_))
        ));
    }

    #[test]
    fn in_memory_vectors_analyze_per_detector() {
        let sampling = crate::prelude::SamplingConfig {
            carrier_hz: 1e6,
            sample_rate_hz: 1e6,
            window_len: 4,
            window_count: 10,
            extra: 0,
            stimulus_offset_hz: 0.0,
        };
        let vectors = vec![
            StatisticVector::with_values("ed", StimulusLevel::Off, sampling.clone(), noise()),
            StatisticVector::with_values(
                "ed",
                StimulusLevel::Power { dbm: -60.0 },
                sampling,
                with_pd(1.0),
            ),
        ];
        let analyses = analyze_vectors(&vectors, &AnalysisParams::default()).unwrap();
        assert_eq!(analyses.len(), 1);
        assert_eq!(analyses[0].curve.points().len(), 1);
        assert_eq!(analyses[0].curve.points()[0].pd, 1.0);
    }
}
