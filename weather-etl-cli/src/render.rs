use std::fmt::Write;

use weather_etl_core::{DashboardView, Metric, SeriesSummary};

/// Plain-text dashboard: current readings, trends, condition distribution.
pub fn dashboard(view: &DashboardView, days: i64) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Weather Data Dashboard (last {days} days)");

    if view.is_empty() {
        let _ = writeln!(
            out,
            "\nNo observations found. Run `weather-etl-cli run` to collect some."
        );
        return out;
    }

    let _ = writeln!(out, "\nCurrent weather");
    let _ = writeln!(
        out,
        "  {:<16} {:<17} {:>8} {:>9} {:>9} {:>6}  {}",
        "city", "observed (UTC)", "temp", "humidity", "pressure", "wind", "conditions"
    );
    for r in view.latest_by_city() {
        let _ = writeln!(
            out,
            "  {:<16} {:<17} {:>8.1} {:>9.0} {:>9.0} {:>6.1}  {}",
            r.city(),
            r.observed_at().format("%Y-%m-%d %H:%M"),
            r.temperature(),
            r.humidity(),
            r.pressure(),
            r.wind_speed(),
            r.description()
        );
    }

    trend(&mut out, view, Metric::Temperature, "Temperature trends");
    trend(&mut out, view, Metric::Humidity, "Humidity trends");

    let _ = writeln!(out, "\nWeather conditions distribution");
    let total = view.observations().len() as f64;
    for (description, count) in view.condition_distribution() {
        let share = count as f64 / total * 100.0;
        let _ = writeln!(out, "  {description:<24} {count:>5} {share:>5.1}%");
    }

    out
}

fn trend(out: &mut String, view: &DashboardView, metric: Metric, title: &str) {
    let _ = writeln!(out, "\n{title}");
    let _ = writeln!(
        out,
        "  {:<16} {:>8} {:>8} {:>8} {:>8} {:>7}",
        "city", "min", "mean", "max", "last", "points"
    );
    for (city, points) in view.series(metric) {
        if let Some(s) = SeriesSummary::of(&points) {
            let _ = writeln!(
                out,
                "  {:<16} {:>8.1} {:>8.1} {:>8.1} {:>8.1} {:>7}",
                city,
                s.min,
                s.mean,
                s.max,
                s.last,
                points.len()
            );
        }
    }
}
