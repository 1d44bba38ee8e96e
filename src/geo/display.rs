//! Formatting of computed daytime windows for the `solar` command.

use chrono::{DateTime, Local, NaiveDate, Offset, TimeZone};
use chrono_tz::Tz;

use super::solar::{SunAngles, calculate_solar_times};

/// `HH:MM:SS`, plus the local-time equivalent in brackets when the zone differs.
fn format_with_local(time: &DateTime<Tz>) -> String {
    let local = time.with_timezone(&Local);
    if time.offset().fix() == local.offset().fix() {
        time.format("%H:%M:%S").to_string()
    } else {
        format!("{} [{} local]", time.format("%H:%M:%S"), local.format("%H:%M:%S"))
    }
}

/// Log the daytime window for a location and date.
pub fn log_solar_window(latitude: f64, longitude: f64, date: NaiveDate, tz: Tz, angles: SunAngles) {
    let lat_dir = if latitude >= 0.0 { "N" } else { "S" };
    let lon_dir = if longitude >= 0.0 { "E" } else { "W" };

    log_block_start!(
        "Daytime window for {:.4}°{}, {:.4}°{} on {}",
        latitude.abs(),
        lat_dir,
        longitude.abs(),
        lon_dir,
        date
    );
    log_indented!("Timezone: {}", tz);
    log_indented!(
        "Boundaries: sun at {:.1}° (morning), {:.1}° (evening)",
        angles.sunrise,
        angles.sunset
    );

    match calculate_solar_times(latitude, longitude, date, &tz, angles) {
        Some(times) => {
            let length = times.sunset.clone() - times.sunrise.clone();
            log_indented!("Day begins: {}", format_with_local(&times.sunrise));
            log_indented!("Day ends:   {}", format_with_local(&times.sunset));
            log_indented!(
                "Length:     {}h {:02}m",
                length.num_hours(),
                length.num_minutes() % 60
            );
        }
        None => {
            log_warning!("The sun does not cross these elevations on this date");
            log_indented!("Decisions at this location will assume daytime");
        }
    }
}

/// The zone's UTC offset at local noon on `date`, as `+HH:MM`.
pub fn utc_offset_label(tz: Tz, date: NaiveDate) -> String {
    let seconds = date
        .and_hms_opt(12, 0, 0)
        .and_then(|noon| tz.from_local_datetime(&noon).single())
        .map(|dt| dt.offset().fix().local_minus_utc())
        .unwrap_or(0);
    let hours = seconds / 3600;
    let minutes = (seconds % 3600).abs() / 60;
    format!("{hours:+03}:{minutes:02}")
}
