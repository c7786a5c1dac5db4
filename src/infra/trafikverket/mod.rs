//! Trafikverket open data API (`TrainAnnouncement` objects).

mod client;

pub use client::{TrafikverketClient, build_request, parse_response};
