//! Event data: the input collections of each event and the per-run records
//! which are needed to interpret them

use crate::{
    error::ProducerError,
    geometry::CaloGeometry,
    objects::{GsfTrack, InputTrack, Jet, McParticle, RecHit},
    status::ChannelStatusTable,
    track::Track,
};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    fmt::{self, Display},
    fs::File,
    io::BufReader,
    path::Path,
    sync::Arc,
};

/// Name under which a collection is stored in an event
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct InputTag {
    /// Name of the module which produced the collection
    pub label: String,

    /// Disambiguates several collections produced by the same module
    #[serde(default)]
    pub instance: String,
}
//
impl InputTag {
    /// Build an input tag
    pub fn new(label: impl Into<String>, instance: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            instance: instance.into(),
        }
    }
}
//
impl Display for InputTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.instance.is_empty() {
            write!(f, "{}", self.label)
        } else {
            write!(f, "{}:{}", self.label, self.instance)
        }
    }
}

/// Input collection of an event
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Product {
    /// Tracks, of either flavour
    Tracks(Vec<InputTrack>),

    /// Particle-flow jets
    Jets(Vec<Jet>),

    /// Simulated particles
    McParticles(Vec<McParticle>),

    /// GSF electron tracks
    GsfTracks(Vec<GsfTrack>),

    /// Calorimeter rec-hits
    RecHits(Vec<RecHit>),
}

/// Collection type which can be looked up in an event
pub trait ProductData {
    /// Extract this collection type from a product, if it has this type
    fn from_product(product: &Product) -> Option<&Self>;
}

macro_rules! impl_product_data {
    ($($variant:ident => $t:ty),*) => {
        $(
            impl ProductData for $t {
                fn from_product(product: &Product) -> Option<&Self> {
                    match product {
                        Product::$variant(data) => Some(data),
                        _ => None,
                    }
                }
            }
        )*
    };
}
//
impl_product_data!(
    Tracks => Vec<InputTrack>,
    Jets => Vec<Jet>,
    McParticles => Vec<McParticle>,
    GsfTracks => Vec<GsfTrack>,
    RecHits => Vec<RecHit>
);

/// Input collection, along with the tag it is stored under
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ProductEntry {
    /// Tag of the collection
    pub tag: InputTag,

    /// Contents of the collection
    pub data: Product,
}

/// One collision event
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Event {
    /// Run in which the event was recorded
    pub run: u32,

    /// Event number within the run
    pub event: u64,

    /// Truth that this is a recorded collision rather than a simulated one
    #[serde(default)]
    pub is_real_data: bool,

    /// Input collections
    #[serde(default)]
    products: Vec<ProductEntry>,

    /// Collections produced while processing the event, by instance label
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    produced: BTreeMap<String, Vec<Track<InputTrack>>>,
}
//
impl Event {
    /// Build an event without any collection
    #[cfg(test)]
    pub fn new(run: u32, event: u64, is_real_data: bool) -> Self {
        Self {
            run,
            event,
            is_real_data,
            ..Default::default()
        }
    }

    /// Add an input collection, replacing any previous one with the same tag
    #[cfg(test)]
    pub fn insert(&mut self, tag: InputTag, data: Product) {
        self.products.retain(|entry| entry.tag != tag);
        self.products.push(ProductEntry { tag, data });
    }

    /// Look up an input collection of a given type
    ///
    /// Returns None if there is no collection with this tag, or if it does not
    /// have the expected type.
    ///
    pub fn get<P: ProductData>(&self, tag: &InputTag) -> Option<&P> {
        self.products
            .iter()
            .find(|entry| &entry.tag == tag)
            .and_then(|entry| P::from_product(&entry.data))
    }

    /// Store a produced track collection under an instance label
    pub fn put(&mut self, instance: impl Into<String>, tracks: Vec<Track<InputTrack>>) {
        self.produced.insert(instance.into(), tracks);
    }

    /// Access a produced track collection
    pub fn produced(&self, instance: &str) -> Option<&[Track<InputTrack>]> {
        self.produced.get(instance).map(Vec::as_slice)
    }

    /// Truth that nothing was produced for this event
    #[cfg(test)]
    pub fn nothing_produced(&self) -> bool {
        self.produced.is_empty()
    }

    /// Load a list of events from a JSON file
    pub fn load_all(path: &Path) -> Result<Vec<Self>, ProducerError> {
        load_json(path)
    }
}

// ### PER-RUN RECORDS ###

/// Conditions of one run, as stored on disk
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    /// Run number
    pub run: u32,

    /// ECAL channel status, if it was recorded for this run
    #[serde(default)]
    pub channel_status: Option<ChannelStatusTable>,
}

/// Conditions database: the records of every run
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Conditions {
    /// Records of each run
    pub runs: Vec<RunRecord>,
}
//
impl Conditions {
    /// Load the conditions database from a JSON file
    pub fn load(path: &Path) -> Result<Self, ProducerError> {
        load_json(path)
    }

    /// Gather the records of a run, along with the detector geometry
    pub fn setup_for(&self, run: u32, geometry: Arc<dyn CaloGeometry>) -> EventSetup {
        let channel_status = self
            .runs
            .iter()
            .find(|record| record.run == run)
            .and_then(|record| record.channel_status.clone());
        EventSetup {
            run,
            geometry,
            channel_status,
        }
    }
}

/// Records which are valid for all events of a run
#[derive(Clone)]
pub struct EventSetup {
    /// Run number
    pub run: u32,

    /// Calorimeter geometry
    pub geometry: Arc<dyn CaloGeometry>,

    /// ECAL channel status, if available
    pub channel_status: Option<ChannelStatusTable>,
}

/// Deserialize a JSON file
fn load_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, ProducerError> {
    let file = File::open(path).map_err(|source| ProducerError::Io {
        path: path.to_owned(),
        source,
    })?;
    serde_json::from_reader(BufReader::new(file)).map_err(|source| ProducerError::Json {
        path: path.to_owned(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{detid::DetectorCellId, geometry::IdealGeometry, objects::RecoTrack};
    use std::io::Write;

    #[test]
    fn typed_lookups() {
        let mut event = Event::new(1, 42, false);
        let tracks = InputTag::new("generalTracks", "");
        let hits = InputTag::new("reducedEcalRecHitsEB", "");
        event.insert(
            tracks.clone(),
            Product::Tracks(vec![InputTrack::Generic(RecoTrack {
                pt: 10.,
                eta: 0.,
                phi: 0.,
                charge: 1,
                num_valid_hits: 8,
            })]),
        );
        event.insert(
            hits.clone(),
            Product::RecHits(vec![RecHit {
                id: DetectorCellId::EcalBarrel { ieta: 1, iphi: 1 },
                energy: 2.,
            }]),
        );

        assert_eq!(event.get::<Vec<InputTrack>>(&tracks).map(Vec::len), Some(1));
        assert_eq!(event.get::<Vec<RecHit>>(&hits).map(Vec::len), Some(1));
        assert!(event.get::<Vec<Jet>>(&tracks).is_none());
        assert!(event.get::<Vec<Jet>>(&InputTag::new("ak4PFJets", "")).is_none());

        event.insert(tracks.clone(), Product::Tracks(Vec::new()));
        assert_eq!(event.get::<Vec<InputTrack>>(&tracks).map(Vec::len), Some(0));

        assert!(event.nothing_produced());
        event.put("", Vec::new());
        assert_eq!(event.produced("").map(<[_]>::len), Some(0));
        assert!(event.produced("other").is_none());
    }

    #[test]
    fn tag_display() {
        assert_eq!(InputTag::new("a", "").to_string(), "a");
        assert_eq!(InputTag::new("a", "b").to_string(), "a:b");
    }

    #[test]
    fn load_events_and_conditions() {
        let mut events_file = tempfile::NamedTempFile::new().expect("Temporary file");
        write!(
            events_file,
            r#"[{{"run": 3, "event": 7, "products": [
                {{"tag": {{"label": "ak4PFJets"}}, "data": {{"jets": []}}}}
            ]}}]"#
        )
        .expect("Temporary file is writable");
        let events = Event::load_all(events_file.path()).expect("Valid events");
        assert_eq!(events.len(), 1);
        assert!(!events[0].is_real_data);
        assert!(events[0]
            .get::<Vec<Jet>>(&InputTag::new("ak4PFJets", ""))
            .is_some());

        let mut conditions_file = tempfile::NamedTempFile::new().expect("Temporary file");
        write!(
            conditions_file,
            r#"{{"runs": [
                {{"run": 3, "channel_status": [
                    {{"id": {{"ecal_barrel": {{"ieta": 1, "iphi": 1}}}}, "status": 12}}
                ]}},
                {{"run": 4}}
            ]}}"#
        )
        .expect("Temporary file is writable");
        let conditions = Conditions::load(conditions_file.path()).expect("Valid conditions");
        let geometry: Arc<dyn CaloGeometry> = Arc::new(IdealGeometry);
        let setup = conditions.setup_for(3, geometry.clone());
        assert_eq!(setup.channel_status.map(|t| t.len()), Some(1));
        assert!(conditions.setup_for(4, geometry.clone()).channel_status.is_none());
        assert!(conditions.setup_for(5, geometry).channel_status.is_none());

        assert!(matches!(
            Conditions::load(Path::new("/nonexistent/conditions.json")),
            Err(ProducerError::Io { .. })
        ));
    }
}
