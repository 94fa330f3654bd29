use std::path::PathBuf;

use anyhow::Result;
use clap::value_t_or_exit;
use flir_geotiff::{arg, args_parser, opt, Config, Parameters};

pub struct Args {
    pub inputs: Vec<PathBuf>,
    pub config: Config,
    pub params: Parameters,
    pub verbosity: u64,
}

impl Args {
    pub fn from_cmd_line() -> Result<Args> {
        let matches = args_parser!("flir2tif")
            .about("Convert raw FLIR frames to PNG previews and GeoTIFF temperature rasters.")
            .arg(opt!("config").short("c").help("JSON configuration file"))
            .arg(opt!("output").short("o").help("Root of the derived product tree"))
            .arg(opt!("catalog").help("Root of the local metadata catalog"))
            .arg(opt!("host").help("Catalog base URL used in resource links"))
            .arg(opt!("staging").help("Directory for per-input staging"))
            .arg(
                opt!("overwrite")
                    .takes_value(false)
                    .help("Regenerate outputs that already exist"),
            )
            .arg(
                opt!("no scale")
                    .takes_value(false)
                    .help("Write 16-bit previews of the raw counts"),
            )
            .arg(
                opt!("rulechecked")
                    .takes_value(false)
                    .help("Inputs were already vetted; skip the decision phase"),
            )
            .arg(
                opt!("verbose")
                    .short("v")
                    .takes_value(false)
                    .multiple(true)
                    .help("Increase log verbosity"),
            )
            .arg(
                arg!("inputs")
                    .required(true)
                    .multiple(true)
                    .help("JSON files with input records"),
            )
            .get_matches();

        let mut config = if matches.is_present("config") {
            Config::from_path(&value_t_or_exit!(matches, "config", PathBuf))?
        } else {
            Config::default()
        };
        if matches.is_present("output") {
            config.output_root = value_t_or_exit!(matches, "output", PathBuf);
        }
        if matches.is_present("catalog") {
            config.catalog_root = value_t_or_exit!(matches, "catalog", PathBuf);
        }
        if let Some(host) = matches.value_of("host") {
            config.host = host.into();
        }
        if matches.is_present("staging") {
            config.staging_root = Some(value_t_or_exit!(matches, "staging", PathBuf));
        }
        config.overwrite |= matches.is_present("overwrite");
        config.scale_values &= !matches.is_present("no scale");

        let inputs = matches
            .values_of("inputs")
            .unwrap()
            .map(|f| f.into())
            .collect();

        Ok(Args {
            inputs,
            config,
            params: Parameters {
                rulechecked: matches.is_present("rulechecked"),
            },
            verbosity: matches.occurrences_of("verbose"),
        })
    }
}
