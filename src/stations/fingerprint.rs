use sha2::{Digest, Sha256};

use super::{identity, Station};

/// Order-independent SHA-256 over a station set.
pub fn build_stations_fingerprint(stations: &[Station]) -> Result<String, serde_json::Error> {
    let mut hasher = Sha256::new();

    // Sort by identity so a reordered collection hashes the same.
    let mut keyed: Vec<(String, &Station)> = stations
        .iter()
        .map(|station| (identity::resolve(station), station))
        .collect();
    keyed.sort_by(|a, b| a.0.cmp(&b.0));

    for (_, station) in keyed {
        let serialized = serde_json::to_vec(station)?;
        hasher.update(serialized);
        hasher.update(b"\n");
    }
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stations::identity::freeze_identity;

    fn station(name: &str, url: &str) -> Station {
        let mut station = Station::new(name, url).with_codec("mp3", 128);
        freeze_identity(&mut station);
        station
    }

    #[test]
    fn fingerprint_is_deterministic() {
        let stations = vec![station("Test", "https://example.com")];
        let fp1 = build_stations_fingerprint(&stations).unwrap();
        let fp2 = build_stations_fingerprint(&stations).unwrap();
        assert_eq!(fp1, fp2);
    }

    #[test]
    fn fingerprint_is_order_independent() {
        let a = station("Station A", "https://a.example.com");
        let b = station("Station B", "https://b.example.com");
        let c = station("Station C", "https://c.example.com");

        let one = build_stations_fingerprint(&[a.clone(), c.clone(), b.clone()]).unwrap();
        let two = build_stations_fingerprint(&[a, b, c]).unwrap();
        assert_eq!(one, two);
    }

    #[test]
    fn fingerprint_changes_with_content() {
        let a = station("Station A", "https://a.example.com");
        let mut renamed = a.clone();
        renamed.name = "Station A+".into();

        assert_ne!(
            build_stations_fingerprint(&[a]).unwrap(),
            build_stations_fingerprint(&[renamed]).unwrap()
        );
    }
}
