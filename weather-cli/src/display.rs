//! Plain-text presentation of a rendered widget.

use std::fmt::Write as _;

use weather_core::{DisplayLayout, DisplayStyle, RenderBody, Rendered, WeatherView};

/// Capitalize the first letter, as the upstream descriptions are lowercase.
fn ucfirst(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn round(value: f64) -> i64 {
    value.round() as i64
}

pub fn render_text(rendered: &Rendered) -> String {
    let mut out = String::new();
    if let Some(title) = &rendered.title {
        let _ = writeln!(out, "{title}");
        let _ = writeln!(out, "{}", "=".repeat(title.chars().count()));
    }

    match &rendered.body {
        RenderBody::Message(text) => {
            let _ = writeln!(out, "{text}");
        }
        RenderBody::Weather(view) if view.style == DisplayStyle::Advanced => advanced(&mut out, view),
        RenderBody::Weather(view) => compact(&mut out, view),
    }

    out
}

fn compact(out: &mut String, view: &WeatherView) {
    let s = &view.snapshot;
    let temp = view.unit.temperature_symbol();

    if let Some(icon) = s.icon_url() {
        let _ = writeln!(out, "[icon: {icon}]");
    }
    let _ = writeln!(out, "{}", s.location_name);
    let _ = writeln!(out, "{}", ucfirst(&s.condition.description));
    let _ = writeln!(out, "Temperature: {}{temp}", round(s.temperature));

    if view.style == DisplayStyle::Standard {
        let _ = writeln!(out, "Feels like: {}{temp}", round(s.feels_like));
        let _ = writeln!(out, "Humidity: {}%", s.humidity_pct);
        let _ = writeln!(out, "Wind Speed: {} {}", s.wind_speed, view.unit.wind_symbol());
        let _ = writeln!(out, "Pressure: {} hPa", s.pressure_hpa);
    }
}

fn advanced(out: &mut String, view: &WeatherView) {
    let s = &view.snapshot;
    let temp = view.unit.temperature_symbol();
    let horizontal = view.layout == DisplayLayout::Horizontal;

    // Header: name, icon, description; horizontal cards also carry the temperatures.
    let _ = writeln!(out, "{}", s.location_name);
    if let Some(icon) = s.icon_url() {
        let _ = writeln!(out, "[icon: {icon}]");
    }
    let _ = writeln!(out, "{}", ucfirst(&s.condition.description));
    if horizontal {
        let _ = writeln!(out, "{}{temp}  (feels like: {}{temp})", round(s.temperature), round(s.feels_like));
    }

    let _ = writeln!(out, "---");
    if !horizontal {
        let _ = writeln!(out, "{}{temp}", round(s.temperature));
        let _ = writeln!(out, "Feels like: {}{temp}", round(s.feels_like));
    }
    let _ = writeln!(out, "Min Temp: {}{temp}", round(s.temp_min));
    let _ = writeln!(out, "Max Temp: {}{temp}", round(s.temp_max));
    let _ = writeln!(out, "Humidity: {}%", s.humidity_pct);
    let _ = writeln!(out, "Pressure: {} hPa", s.pressure_hpa);
    let _ = writeln!(out, "Wind: {} {}", s.wind_speed, view.unit.wind_symbol());
    match s.visibility_km() {
        Some(km) => {
            let _ = writeln!(out, "Visibility: {km} km");
        }
        None => {
            let _ = writeln!(out, "Visibility: n/a");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use weather_core::{Unit, WeatherSnapshot, model::Condition};

    fn view(style: DisplayStyle, layout: DisplayLayout, unit: Unit) -> Rendered {
        Rendered {
            title: Some("Weather".into()),
            body: RenderBody::Weather(WeatherView {
                style,
                layout,
                unit,
                snapshot: WeatherSnapshot {
                    location_name: "London".into(),
                    temperature: 11.6,
                    feels_like: 10.2,
                    temp_min: 9.4,
                    temp_max: 13.1,
                    humidity_pct: 81,
                    pressure_hpa: 1012.0,
                    wind_speed: 4.6,
                    visibility_m: Some(10000),
                    condition: Condition { icon: "10d".into(), description: "light rain".into() },
                },
            }),
        }
    }

    #[test]
    fn minimal_shows_only_basics() {
        let out = render_text(&view(DisplayStyle::Minimal, DisplayLayout::Vertical, Unit::Metric));

        assert!(out.contains("London"));
        assert!(out.contains("Light rain"));
        assert!(out.contains("Temperature: 12°C"));
        assert!(!out.contains("Humidity"));
    }

    #[test]
    fn standard_adds_details_in_imperial() {
        let out = render_text(&view(DisplayStyle::Standard, DisplayLayout::Vertical, Unit::Imperial));

        assert!(out.contains("Feels like: 10°F"));
        assert!(out.contains("Wind Speed: 4.6 mph"));
        assert!(out.contains("Humidity: 81%"));
        assert!(!out.contains("Visibility"));
    }

    #[test]
    fn advanced_shows_extremes_and_visibility() {
        let out = render_text(&view(DisplayStyle::Advanced, DisplayLayout::Vertical, Unit::Metric));

        assert!(out.contains("Min Temp: 9°C"));
        assert!(out.contains("Max Temp: 13°C"));
        assert!(out.contains("Visibility: 10 km"));
    }

    #[test]
    fn horizontal_layout_moves_temperature_to_header() {
        let out = render_text(&view(DisplayStyle::Advanced, DisplayLayout::Horizontal, Unit::Metric));
        let (header, body) = out.split_once("---").unwrap();

        assert!(header.contains("12°C  (feels like: 10°C)"));
        assert!(!body.contains("Feels like"));
    }

    #[test]
    fn messages_render_verbatim() {
        let out = render_text(&Rendered {
            title: None,
            body: RenderBody::Message("Please set a city in widget settings.".into()),
        });
        assert_eq!(out, "Please set a city in widget settings.\n");
    }
}
