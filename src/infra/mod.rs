pub mod trafikverket;
