/// Shared fixtures: a scratch study tree and a synthetic FIF writer.
use megbids::fiff::constants::*;
use megbids::fiff::ChannelInfo;
use megbids::{ConversionConfig, ReferenceTable};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// `raw/`, `bids/`, `pos/` and a reference table under one temp dir.
pub struct Study {
    pub dir: TempDir,
    pub config: ConversionConfig,
}

#[allow(unused)]
impl Study {
    /// Empty study with the given reference table text (TSV or CSV).
    pub fn new(table: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = ConversionConfig::default();
        config.paths.raw_root = dir.path().join("raw");
        config.paths.bids_root = dir.path().join("bids");
        config.paths.pos_root = dir.path().join("pos");
        config.paths.subject_table = dir.path().join("subjects.tsv");
        std::fs::create_dir_all(&config.paths.raw_root).unwrap();
        std::fs::create_dir_all(&config.paths.pos_root).unwrap();
        std::fs::write(&config.paths.subject_table, table).unwrap();
        Self { dir, config }
    }

    pub fn table(&self) -> ReferenceTable {
        ReferenceTable::load(&self.config.paths.subject_table, &self.config.id_columns).unwrap()
    }

    pub fn raw_dir(&self, native: &str) -> PathBuf {
        let dir = self.config.paths.raw_root.join(native).join(format!("{native}-1"));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    /// One synthetic recording per run 1..=6 for `native`.
    pub fn add_raw_runs(&self, native: &str, fif: &FifSpec) -> Vec<PathBuf> {
        let dir = self.raw_dir(native);
        (1..=6)
            .map(|run| {
                let path = dir.join(format!("{native}_FGCM_20230504_{run:02}.fif"));
                std::fs::write(&path, fif.encode()).unwrap();
                path
            })
            .collect()
    }

    pub fn write_pos(&self, name: &str, text: &str) -> PathBuf {
        let path = self.config.paths.pos_root.join(name);
        std::fs::write(&path, text).unwrap();
        path
    }

    /// A converted `meg/` directory with the two sidecars the attacher edits.
    pub fn add_meg_dir(&self, tag: &str, session: Option<&str>, with_coordsystem: bool) -> PathBuf {
        let mut dir = self.config.paths.bids_root.join(tag);
        let mut prefix = tag.to_string();
        if let Some(ses) = session {
            dir = dir.join(format!("ses-{ses}"));
            prefix = format!("{prefix}_ses-{ses}");
        }
        let meg = dir.join("meg");
        std::fs::create_dir_all(&meg).unwrap();
        std::fs::write(
            meg.join(format!("{prefix}_task-audiobase_meg.json")),
            r#"{"TaskName": "audiobase", "DigitizedHeadPoints": false}"#,
        )
        .unwrap();
        if with_coordsystem {
            std::fs::write(
                meg.join(format!("{prefix}_coordsystem.json")),
                r#"{"MEGCoordinateSystem": "CTF", "MEGCoordinateUnits": "m"}"#,
            )
            .unwrap();
        }
        meg
    }
}

#[allow(unused)]
pub fn read_json(path: &Path) -> serde_json::Value {
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

// ── Synthetic FIF ────────────────────────────────────────────────────────

/// Minimal raw FIF: file id, measurement info, one float data buffer and an
/// annotations block.  Tags are sequential (no embedded directory).
#[derive(Debug, Clone)]
pub struct FifSpec {
    /// `(name, kind, coil)`.
    pub channels: Vec<(String, i32, i32)>,
    pub sfreq: f32,
    pub meas_secs: Option<i32>,
    pub file_id_secs: i32,
    pub line_freq: Option<f32>,
    pub n_samples: usize,
    pub annotations: Vec<String>,
    pub bads: Vec<String>,
}

impl Default for FifSpec {
    fn default() -> Self {
        Self {
            channels: vec![
                ("MLC11-2104".into(), FIFFV_MEG_CH, 5001),
                ("BG1-2104".into(), FIFFV_REF_MEG_CH, 5002),
                ("ECG".into(), FIFFV_MISC_CH, FIFFV_COIL_NONE),
                ("UPPT001".into(), FIFFV_MISC_CH, FIFFV_COIL_NONE),
                ("UADC005-2104".into(), FIFFV_MISC_CH, FIFFV_COIL_NONE),
                ("UADC007-2104".into(), FIFFV_MISC_CH, FIFFV_COIL_NONE),
            ],
            sfreq: 600.0,
            meas_secs: Some(1_683_201_600), // 2023-05-04T12:00:00Z
            file_id_secs: 1_683_201_600,
            line_freq: Some(60.0),
            n_samples: 1200,
            annotations: vec!["startACQ".into(), "CSminus".into(), "CSminus".into()],
            bads: Vec::new(),
        }
    }
}

#[allow(unused)]
impl FifSpec {
    pub fn encode(&self) -> Vec<u8> {
        let int = |v: i32| v.to_be_bytes().to_vec();
        let float = |v: f32| v.to_be_bytes().to_vec();

        let mut file_id = vec![0u8; 20];
        file_id[0..4].copy_from_slice(&0x0001_0003_i32.to_be_bytes());
        file_id[12..16].copy_from_slice(&self.file_id_secs.to_be_bytes());

        let mut tags: Vec<(i32, u32, Vec<u8>)> = vec![
            (FIFF_FILE_ID, FIFFT_ID_STRUCT, file_id),
            (FIFF_DIR_POINTER, FIFFT_INT, int(-1)),
            (FIFF_BLOCK_START, FIFFT_INT, int(FIFFB_MEAS)),
            (FIFF_BLOCK_START, FIFFT_INT, int(FIFFB_MEAS_INFO)),
            (FIFF_NCHAN, FIFFT_INT, int(self.channels.len() as i32)),
            (FIFF_SFREQ, FIFFT_FLOAT, float(self.sfreq)),
            (FIFF_LOWPASS, FIFFT_FLOAT, float(150.0)),
            (FIFF_HIGHPASS, FIFFT_FLOAT, float(0.1)),
        ];
        if let Some(hz) = self.line_freq {
            tags.push((FIFF_LINE_FREQ, FIFFT_FLOAT, float(hz)));
        }
        if let Some(secs) = self.meas_secs {
            let mut date = int(secs);
            date.extend(int(250));
            tags.push((FIFF_MEAS_DATE, FIFFT_INT, date));
        }
        for (i, (name, kind, coil)) in self.channels.iter().enumerate() {
            let mut ch = ChannelInfo::from_bytes(&[0u8; ChannelInfo::SIZE]).unwrap();
            ch.scan_no = i as i32 + 1;
            ch.log_no = i as i32 + 1;
            ch.kind = *kind;
            ch.coil_type = *coil;
            ch.range = 1.0;
            ch.cal = 1.0;
            ch.name = name.clone();
            tags.push((FIFF_CH_INFO, FIFFT_CH_INFO_STRUCT, ch.to_bytes().to_vec()));
        }
        if !self.bads.is_empty() {
            tags.push((FIFF_BAD_CHS, FIFFT_STRING, self.bads.join(":").into_bytes()));
        }
        tags.push((FIFF_BLOCK_END, FIFFT_INT, int(FIFFB_MEAS_INFO)));

        tags.push((FIFF_BLOCK_START, FIFFT_INT, int(FIFFB_RAW_DATA)));
        let buffer = vec![0u8; self.n_samples * self.channels.len() * 4];
        tags.push((FIFF_DATA_BUFFER, FIFFT_FLOAT, buffer));
        tags.push((FIFF_BLOCK_END, FIFFT_INT, int(FIFFB_RAW_DATA)));

        if !self.annotations.is_empty() {
            tags.push((FIFF_BLOCK_START, FIFFT_INT, int(FIFFB_MNE_ANNOTATIONS)));
            let joined = self
                .annotations
                .iter()
                .map(|a| a.replace(':', ";"))
                .collect::<Vec<_>>()
                .join(":");
            tags.push((FIFF_COMMENT, FIFFT_STRING, joined.into_bytes()));
            tags.push((FIFF_BLOCK_END, FIFFT_INT, int(FIFFB_MNE_ANNOTATIONS)));
        }
        tags.push((FIFF_BLOCK_END, FIFFT_INT, int(FIFFB_MEAS)));

        let mut out = Vec::new();
        for (i, (kind, ftype, payload)) in tags.iter().enumerate() {
            let next = if i + 1 == tags.len() { FIFFV_NEXT_NONE } else { FIFFV_NEXT_SEQ };
            out.extend_from_slice(&kind.to_be_bytes());
            out.extend_from_slice(&ftype.to_be_bytes());
            out.extend_from_slice(&(payload.len() as i32).to_be_bytes());
            out.extend_from_slice(&next.to_be_bytes());
            out.extend_from_slice(payload);
        }
        out
    }

    pub fn write(&self, path: &Path) {
        std::fs::write(path, self.encode()).unwrap();
    }
}
