use anyhow::{Context, Result};
use skybook_core::{Config, TemperatureUnit};
use skybook_weather::{BookmarkStore, ForecastResult, GeoWeatherClient, WeatherSession};

const USAGE: &str = "Usage:
  skybook lookup <city> <state> [--save]   Show the current hour's forecast
  skybook saved                            List bookmarked locations
  skybook forget <key>                     Remove bookmarks for a location key";

#[tokio::main]
async fn main() -> Result<()> {
    skybook_core::init()?;

    let (config, _) = Config::load_validated()?;
    let client = GeoWeatherClient::new(&config.weather)?;
    let store = BookmarkStore::open(config.storage.database_path())
        .context("Failed to open bookmark store")?;
    let mut session = WeatherSession::new(client, store);
    let unit = config.weather.temperature_unit;

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
        ["lookup", city, state, rest @ ..] => {
            let save = rest.contains(&"--save");
            lookup(&mut session, city, state, save, unit).await
        }
        ["saved"] => {
            list_saved(&session, unit);
            Ok(())
        }
        ["forget", key] => forget(&mut session, key),
        _ => {
            println!("{}", USAGE);
            Ok(())
        }
    }
}

async fn lookup(
    session: &mut WeatherSession,
    city: &str,
    state: &str,
    save: bool,
    unit: TemperatureUnit,
) -> Result<()> {
    let location = match session.lookup_location(city, state).await {
        Ok(location) => location.clone(),
        Err(e) => {
            println!("{}", e.user_message());
            return Err(e.into());
        }
    };
    println!("{} ({})", location.display_name, location.key());

    let forecast = match session.fetch_weather(&location).await {
        Ok(forecast) => forecast.clone(),
        Err(e) => {
            println!("{}", e.user_message());
            return Err(e.into());
        }
    };
    print_current(&forecast, unit);

    if save {
        session.save_location(&location)?;
        session.save_search_result(&forecast, &location)?;
        println!("Saved {}", location.name);
    }

    Ok(())
}

fn list_saved(session: &WeatherSession, unit: TemperatureUnit) {
    if session.saved_locations().is_empty() {
        println!("No saved locations");
    }

    for location in session.saved_locations() {
        println!("{}  {}", location.key(), location.display_name);
        if let Some(forecast) = session.saved_search(location) {
            print!("    saved {}: ", forecast.fetched_at.format("%Y-%m-%d %H:%M UTC"));
            print_current(forecast, unit);
        }
    }

    let dangling = session
        .saved_searches()
        .keys()
        .filter(|key| {
            !session
                .saved_locations()
                .iter()
                .any(|location| &location.key() == *key)
        })
        .count();
    if dangling > 0 {
        tracing::debug!("{} saved search(es) without a saved location", dangling);
    }
}

fn forget(session: &mut WeatherSession, key: &str) -> Result<()> {
    let saved = session
        .saved_locations()
        .iter()
        .find(|location| location.key() == key)
        .cloned();

    if let Some(location) = saved {
        session.unsave_location(&location)?;
    }
    session.unsave_search_key(key)?;
    println!("Forgot {}", key);
    Ok(())
}

fn print_current(forecast: &ForecastResult, unit: TemperatureUnit) {
    match forecast.current() {
        Ok(reading) => println!(
            "{:.1}{}, {}% chance of precipitation, {:.2} precipitation",
            reading.temperature,
            unit.symbol(),
            reading.precipitation_probability,
            reading.precipitation
        ),
        Err(e) => {
            tracing::warn!("{}", e);
            println!("{}", e.user_message());
        }
    }
}
