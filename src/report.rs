use std::fmt::{self, Write};

use crate::models::Analysis;

const BAR_WIDTH: usize = 40;

pub fn file_name(analysis: &Analysis) -> String {
    format!("fish-report-{}.txt", analysis.id)
}

/// Plain-text report of an analysis, suitable for download or the terminal.
pub fn render(analysis: &Analysis) -> String {
    let mut out = String::new();
    write_report(&mut out, analysis).expect("formatting into a String does not fail");
    out
}

fn write_report(out: &mut String, analysis: &Analysis) -> fmt::Result {
    let prediction = &analysis.prediction;
    let image = &analysis.image;

    writeln!(out, "Fish Species Analysis Report")?;
    writeln!(out, "============================")?;
    writeln!(out, "Analysis ID: {}", analysis.id)?;
    if let Some(file_name) = &analysis.file_name {
        writeln!(out, "File: {}", file_name)?;
    }
    writeln!(
        out,
        "Image: {}x{} pixels, {} mode ({})",
        image.width, image.height, image.mode, image.format
    )?;
    writeln!(out, "Backend: {}", analysis.backend)?;
    writeln!(out)?;
    writeln!(out, "Prediction: {}", prediction.predicted_class)?;
    writeln!(out, "Confidence: {:.1}%", prediction.confidence * 100.0)?;
    writeln!(out)?;

    writeln!(out, "Top {} Predictions", prediction.top_predictions.len())?;
    let width = prediction
        .top_predictions
        .iter()
        .map(|score| score.label.chars().count())
        .max()
        .unwrap_or(0);
    for (rank, score) in prediction.top_predictions.iter().enumerate() {
        let filled = (score.probability.clamp(0.0, 1.0) * BAR_WIDTH as f32).round() as usize;
        writeln!(
            out,
            "{:>2}. {:<width$}  {:>6.2}%  {}",
            rank + 1,
            score.label,
            score.probability * 100.0,
            "#".repeat(filled),
            width = width
        )?;
    }
    writeln!(out)?;
    writeln!(out, "Assessment: {}", analysis.advice)
}
