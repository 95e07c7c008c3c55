//! Result reporting: a plain-text best-trial summary and an HTML report.
//!
//! The HTML report is a single self-contained file with embedded
//! [Plotly.js](https://plotly.com/javascript/) charts:
//!
//! | Chart | Description |
//! |---|---|
//! | **Optimization history** | Objective value vs trial number with best-so-far line |
//! | **Intermediate values** | Per-trial validation curves, pruned trials highlighted |
//! | **Parameter contour** | Objective over the two most important numeric parameters |
//! | **Parameter importance** | Normalized absolute Spearman correlation |
//! | **Trial states** | One bar per trial, coloured by terminal state |
//!
//! An internet connection is needed on first load to fetch `Plotly.js` from a
//! CDN.

use core::fmt::Write as _;
use std::path::Path;

use crate::context::RunContext;
use crate::distribution::Distribution;
use crate::error::Result;
use crate::hyperparams::ParamEntry;
use crate::study::Study;
use crate::trial::TrialRecord;
use crate::types::{Direction, TrialState};

/// Formats the best-trial summary.
///
/// ```text
/// Best trial is #2
///   Value: 0.85
///   Hyperparameters:
///     batch_size: 7
///     ...
/// ```
#[must_use]
pub fn format_best_trial(trial: &TrialRecord) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Best trial is #{}", trial.number);
    if let Some(value) = trial.value {
        let _ = writeln!(out, "  Value: {value}");
    }
    out.push_str("  Hyperparameters:\n");
    for entry in &trial.params {
        let _ = writeln!(out, "    {}: {}", entry.name, entry.value);
    }
    out
}

/// Writes `best_trial.txt` and `report.html` into the run directory.
///
/// With no completed trial the summary is skipped and only the HTML report is
/// written.
///
/// # Errors
///
/// Ledger errors, and [`Error::Io`](crate::Error::Io) if a file cannot be
/// written.
pub fn write_reports(study: &Study, context: &RunContext) -> Result<()> {
    match study.best_trial() {
        Ok(best) => {
            crate::checkpoint::write_atomic(
                &context.best_trial_path(),
                format_best_trial(&best).as_bytes(),
            )?;
            trace_info!(
                trial = best.number,
                value = best.value,
                path = %context.best_trial_path().display(),
                "best trial written"
            );
        }
        Err(crate::Error::NoCompletedTrials) => {
            trace_warn!("no completed trials; skipping best-trial summary");
        }
        Err(e) => return Err(e),
    }
    generate_html_report(study, &context.report_path())
}

/// Writes the HTML report for `study` to `path`.
///
/// # Errors
///
/// Ledger errors, and [`Error::Io`](crate::Error::Io) if the file cannot be
/// written.
pub fn generate_html_report(study: &Study, path: &Path) -> Result<()> {
    let trials = study.trials()?;
    let importance = study.param_importance()?;
    let html = build_html(
        study.name(),
        study.metric(),
        &trials,
        study.direction(),
        &importance,
    );
    std::fs::write(path, html)?;
    Ok(())
}

fn build_html(
    name: &str,
    metric: &str,
    trials: &[TrialRecord],
    direction: Direction,
    importance: &[(String, f64)],
) -> String {
    let mut html = String::with_capacity(8192);
    let n_complete = trials
        .iter()
        .filter(|t| t.state == TrialState::Complete)
        .count();
    let n_pruned = trials
        .iter()
        .filter(|t| t.state == TrialState::Pruned)
        .count();

    let _ = write!(
        html,
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{title}</title>
<script src="https://cdn.plot.ly/plotly-2.35.2.min.js"></script>
<style>
  * {{ margin: 0; padding: 0; box-sizing: border-box; }}
  body {{ font-family: -apple-system, BlinkMacSystemFont, "Segoe UI", Roboto, sans-serif;
         background: #f5f6fa; color: #2c3e50; padding: 24px; }}
  h1 {{ text-align: center; margin-bottom: 8px; font-size: 1.8em; }}
  .subtitle {{ text-align: center; color: #7f8c8d; margin-bottom: 24px; }}
  .chart {{ background: #fff; border-radius: 8px; box-shadow: 0 2px 8px rgba(0,0,0,0.08);
            margin-bottom: 24px; padding: 16px; }}
  .chart-title {{ font-size: 1.1em; font-weight: 600; margin-bottom: 8px; }}
</style>
</head>
<body>
<h1>{title}</h1>
<p class="subtitle">{metric} &middot; {dir} &middot; {n} trials ({n_complete} complete, {n_pruned} pruned)</p>
"#,
        title = escape_html(name),
        metric = escape_html(metric),
        dir = direction.as_str(),
        n = trials.len(),
    );

    if n_complete > 0 {
        chart(&mut html, "history", "Optimization History");
        write_history_chart(&mut html, trials, direction, metric);
    }

    if trials.iter().any(|t| !t.intermediate_values.is_empty()) {
        chart(&mut html, "intermediate", "Intermediate Values");
        write_intermediate_chart(&mut html, trials, metric);
    }

    let numeric: Vec<&str> = importance
        .iter()
        .map(|(n, _)| n.as_str())
        .filter(|n| is_numeric(trials, n))
        .collect();
    if numeric.len() >= 2 && n_complete >= 3 {
        chart(&mut html, "contour", "Parameter Contour");
        write_contour_chart(&mut html, trials, numeric[0], numeric[1], direction);
    }

    if !importance.is_empty() {
        chart(&mut html, "importance", "Parameter Importance");
        write_importance_chart(&mut html, importance);
    }

    if !trials.is_empty() {
        chart(&mut html, "states", "Trial States");
        write_state_chart(&mut html, trials);
    }

    html.push_str("</body>\n</html>\n");
    html
}

fn chart(html: &mut String, id: &str, title: &str) {
    let _ = writeln!(
        html,
        "<div class=\"chart\"><div class=\"chart-title\">{title}</div><div id=\"{id}\"></div></div>"
    );
}

fn complete(trials: &[TrialRecord]) -> impl Iterator<Item = (&TrialRecord, f64)> {
    trials
        .iter()
        .filter(|t| t.state == TrialState::Complete)
        .filter_map(|t| t.value.map(|v| (t, v)))
}

fn write_history_chart(
    html: &mut String,
    trials: &[TrialRecord],
    direction: Direction,
    metric: &str,
) {
    let mut ids = Vec::new();
    let mut vals = Vec::new();
    let mut best_vals = Vec::new();
    let mut best: Option<f64> = None;
    for (t, v) in complete(trials) {
        ids.push(t.number);
        vals.push(v);
        if best.is_none_or(|b| direction.is_better(v, b)) {
            best = Some(v);
        }
        best_vals.push(best.unwrap_or(v));
    }

    let _ = write!(
        html,
        r##"<script>
Plotly.newPlot("history", [
  {{ x: {ids:?}, y: {vals:?}, mode: "markers", name: "Objective", type: "scatter",
     marker: {{ color: "#3498db", size: 6 }} }},
  {{ x: {ids:?}, y: {best_vals:?}, mode: "lines", name: "Best so far", type: "scatter",
     line: {{ color: "#e74c3c", width: 2 }} }}
], {{ xaxis: {{ title: "Trial" }}, yaxis: {{ title: "{metric}" }},
     margin: {{ t: 10 }}, legend: {{ x: 1, xanchor: "right", y: 1 }} }},
   {{ responsive: true }});
</script>
"##,
        metric = escape_js(metric),
    );
}

fn write_intermediate_chart(html: &mut String, trials: &[TrialRecord], metric: &str) {
    let mut traces = String::new();
    for t in trials.iter().filter(|t| !t.intermediate_values.is_empty()) {
        let curve = t.intermediate_values.as_slice();
        let steps: Vec<u64> = curve.iter().map(|&(s, _)| s).collect();
        let values: Vec<f64> = curve.iter().map(|&(_, v)| v).collect();
        let color = match t.state {
            TrialState::Pruned => "#f39c12",
            TrialState::Failed => "#e74c3c",
            _ => "#3498db",
        };
        let _ = write!(
            traces,
            r#"{{ x: {steps:?}, y: {values:?}, mode: "lines+markers", name: "Trial {id}",
               line: {{ color: "{color}", width: 1 }}, marker: {{ size: 3 }} }},"#,
            id = t.number,
        );
    }

    let _ = write!(
        html,
        r#"<script>
Plotly.newPlot("intermediate", [{traces}],
  {{ xaxis: {{ title: "Epoch" }}, yaxis: {{ title: "{metric}" }},
     margin: {{ t: 10 }}, showlegend: true }},
  {{ responsive: true }});
</script>
"#,
        metric = escape_js(metric),
    );
}

fn write_contour_chart(
    html: &mut String,
    trials: &[TrialRecord],
    x_name: &str,
    y_name: &str,
    direction: Direction,
) {
    let (mut xs, mut ys, mut zs) = (Vec::new(), Vec::new(), Vec::new());
    for (t, v) in complete(trials) {
        let x = t.params.iter().find(|e| e.name == x_name).and_then(numeric_value);
        let y = t.params.iter().find(|e| e.name == y_name).and_then(numeric_value);
        if let (Some(x), Some(y)) = (x, y) {
            xs.push(x);
            ys.push(y);
            zs.push(v);
        }
    }
    let reverse = direction == Direction::Minimize;

    let _ = write!(
        html,
        r##"<script>
Plotly.newPlot("contour", [
  {{ type: "contour", x: {xs:?}, y: {ys:?}, z: {zs:?}, colorscale: "Blues",
     reversescale: {reverse}, connectgaps: true, contours: {{ coloring: "heatmap" }} }},
  {{ type: "scatter", mode: "markers", x: {xs:?}, y: {ys:?}, showlegend: false,
     marker: {{ color: "#2c3e50", size: 5 }} }}
], {{ xaxis: {{ title: "{x}" }}, yaxis: {{ title: "{y}" }}, margin: {{ t: 10 }} }},
   {{ responsive: true }});
</script>
"##,
        x = escape_js(x_name),
        y = escape_js(y_name),
    );
}

fn write_importance_chart(html: &mut String, importance: &[(String, f64)]) {
    let names: Vec<_> = importance
        .iter()
        .rev()
        .map(|(n, _)| format!("\"{}\"", escape_js(n)))
        .collect();
    let values: Vec<f64> = importance.iter().rev().map(|(_, v)| *v).collect();

    let _ = write!(
        html,
        r##"<script>
Plotly.newPlot("importance", [{{
  x: {values:?}, y: [{names}], type: "bar", orientation: "h",
  marker: {{ color: "#9b59b6" }}
}}], {{ xaxis: {{ title: "Importance (normalized |Spearman ρ|)" }},
       yaxis: {{ automargin: true }}, margin: {{ t: 10, l: 140 }} }},
   {{ responsive: true }});
</script>
"##,
        names = names.join(","),
    );
}

fn write_state_chart(html: &mut String, trials: &[TrialRecord]) {
    let mut ids = Vec::with_capacity(trials.len());
    let mut colors = Vec::with_capacity(trials.len());
    let mut labels = Vec::with_capacity(trials.len());
    let mut lengths = Vec::with_capacity(trials.len());

    for t in trials {
        ids.push(format!("\"Trial {}\"", t.number));
        let color = match t.state {
            TrialState::Complete => "#2ecc71",
            TrialState::Pruned => "#f39c12",
            TrialState::Failed => "#e74c3c",
            TrialState::Running => "#3498db",
        };
        colors.push(format!("\"{color}\""));
        labels.push(format!("\"{}\"", t.state.as_str()));
        lengths.push(t.last_step().unwrap_or(0));
    }

    let _ = write!(
        html,
        r#"<script>
Plotly.newPlot("states", [{{
  y: [{ids}], x: {lengths:?}, type: "bar", orientation: "h",
  text: [{labels}], textposition: "auto",
  marker: {{ color: [{colors}] }}
}}], {{ xaxis: {{ title: "Epochs reported" }}, yaxis: {{ automargin: true, autorange: "reversed" }},
       margin: {{ t: 10, l: 80 }}, showlegend: false }},
   {{ responsive: true }});
</script>
"#,
        ids = ids.join(","),
        colors = colors.join(","),
        labels = labels.join(","),
    );
}

/// Position on a numeric axis; categorical values map to their choice index.
#[allow(clippy::cast_precision_loss)]
fn numeric_value(entry: &ParamEntry) -> Option<f64> {
    entry.value.as_f64().or_else(|| match &entry.distribution {
        Distribution::Categorical(c) => c.index_of(&entry.value).map(|i| i as f64),
        _ => None,
    })
}

fn is_numeric(trials: &[TrialRecord], name: &str) -> bool {
    trials
        .iter()
        .flat_map(|t| t.params.iter())
        .find(|e| e.name == name)
        .is_some_and(|e| !matches!(e.distribution, Distribution::Categorical(_)))
}

fn escape_js(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn study() -> Study {
        let study = Study::builder().name("report").maximize().build().unwrap();
        for (i, v) in [0.80, f64::NAN, 0.85].into_iter().enumerate() {
            let mut t = study.create_trial().unwrap();
            t.suggest_int("batch_size", 1, 15).unwrap();
            t.suggest_float("dropout", 0.1, 0.9).unwrap();
            t.report(1, 0.5).unwrap();
            if i == 1 {
                study.prune_trial(t).unwrap();
            } else {
                study.complete_trial(t, v).unwrap();
            }
        }
        study
    }

    #[test]
    fn summary_names_the_best_complete_trial() {
        let best = study().best_trial().unwrap();
        let text = format_best_trial(&best);
        assert!(text.starts_with("Best trial is #2\n  Value: 0.85\n  Hyperparameters:\n"));
        assert!(text.contains("    batch_size: "));
        assert!(text.contains("    dropout: "));
    }

    #[test]
    fn html_report_contains_the_charts() {
        let study = study();
        let trials = study.trials().unwrap();
        let html = build_html("report", "val_accuracy", &trials, Direction::Maximize, &[]);
        assert!(html.contains("id=\"history\""));
        assert!(html.contains("id=\"intermediate\""));
        assert!(html.contains("id=\"states\""));
        assert!(!html.contains("id=\"importance\""));
    }

    #[test]
    fn write_reports_creates_both_files() {
        let nanos = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        let root = std::env::temp_dir().join(format!("skin_search_report_{nanos}"));
        let ctx = RunContext::create(&root).unwrap();
        write_reports(&study(), &ctx).unwrap();
        assert!(ctx.best_trial_path().exists());
        assert!(ctx.report_path().exists());
        std::fs::remove_dir_all(&root).unwrap();
    }
}
