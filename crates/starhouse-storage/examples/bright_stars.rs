//! Build a tiny bright-star catalog and query it.
//!
//! ```bash
//! cargo run -p starhouse-storage --example bright_stars -- /tmp/bright-stars
//! ```

use starhouse_core::{Codec, Record, Star};
use starhouse_storage::{BuildConfig, Catalog, MaxValue, Predicate, TracingObserver};

const STARS: [(&str, i64, f64, f64, f64, &str); 6] = [
    ("Sirius", 32349, 101.287155, -16.716116, -1.44, "cma"),
    ("Canopus", 30438, 95.987958, -52.695661, -0.62, "car"),
    ("Rigel", 24436, 78.634467, -8.201638, 0.18, "ori"),
    ("Betelgeuse", 27989, 88.792939, 7.407064, 0.45, "ori"),
    ("Polaris", 11767, 37.954561, 89.264109, 1.97, "umi"),
    ("Proxima Centauri", 70890, 217.428953, -62.679484, 11.13, "cen"),
];

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let root = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "/tmp/starhouse-bright-stars".to_string());

    let config = BuildConfig::builder()
        .output_path(&root)
        .chunk_size(1_000)
        .schema(Star::schema())
        .partition_columns(Vec::<String>::new())
        .sorting_columns(["magnitude"])
        .compression(Codec::Lz4)
        .row_group_size(100)
        .resolution(10)
        .build()?;

    let records = STARS.iter().map(|&(name, hip, ra, dec, magnitude, constellation)| {
        Record::from(Star {
            hip: Some(hip),
            ra,
            dec,
            magnitude,
            constellation_id: Some(constellation.to_string()),
            epoch_year: 1991,
            name: Some(name.to_string()),
            ..Star::default()
        })
    });

    let report = Catalog::build(&config, records, &MaxValue::new("magnitude", 9.0), &TracingObserver)?;
    println!("{report}");

    let catalog = Catalog::open(&root, 10)?;
    for file in &catalog.manifest().files {
        println!("{} ({} records, {} bytes, crc32 {:08x})", file.path, file.record_count, file.size_bytes, file.crc32);
    }
    for record in catalog.all()? {
        let star = Star::try_from(record?)?;
        println!(
            "pk={:<2} {:<12} mag {:>5.2}  cell {}",
            star.pk.unwrap_or_default(),
            star.name.as_deref().unwrap_or("-"),
            star.magnitude,
            star.healpix_index.unwrap_or_default()
        );
    }

    if let Some(sirius) = catalog.get(&Predicate::eq("name", "Sirius"))? {
        println!("found Sirius: {:?}", Star::try_from(sirius)?);
    }

    let orion = catalog.cone(83.8, -5.4, 10.0)?;
    println!("{} stars within 10 degrees of Orion's belt", orion.len());
    Ok(())
}
