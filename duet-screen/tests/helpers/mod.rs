//! Test Helper Utilities
//!
//! Shared fixtures for duet-screen integration tests

#![allow(dead_code)]

pub mod log_capture;

pub use log_capture::{capture_logs, LogCapture};

use duet_common::config::{load_config, Config};
use std::path::PathBuf;
use tempfile::TempDir;

pub const INPUTS_CSV: &str = "\
id,type,value
CRBN,protein,MAGEGDQQDAAHNMGNHLPLLPAESEEEDEMEVEDQDSKEAKKPNIINFDTSLPTSHTYLGADMEEFHGRTLHDDDSCQVIPVLPQVMMILIPGQTLPLQLFHPQEVSMVRNLIQKDRTFAVLAYSNVQEREAQFGTTAEIYAYREEQDFGIEIVKVKAIGRQRFKVLELRTQSDGIQQAKVQILPECVLPSTMSAVQLESLNKCQIFPSKPVSREDQCSYKWWQKYQKRKFHCANLTSWPRWLYSLYDAETLMDRIKKQLREWDENLKDDSLPSNPIDFSYRVAACLPIDDVLRIQLLKIGSAIQRLRCELDIMNKCTSLCCKQCQETEITTKNEIFSLSLCGPMAAYVNPHGYVHETLTVYKACNLNLIGRPSTEHSWFPGYAWTVAQCKICASHIGWKFTATKKDMSPQKFWGLTRSALLPTIPDTEDEISPDKVILCL
VHL,protein,MPRRAENWDEAEVGAEEAGVEEYGPEEDGGEESGAEESGPEESGPEELGAEEEMEAGRPRPVLRSVNSREPSQVIFCNRSPRVVLPVWLNFDGEPQPYPTLPPGTGRRIHSYRGHLWLFRDAGTHDGLLVNQTELFVPSLNVDGQPIFANITLPVYTLKERCLQVVRSLVKPENYRRLDIVRSLYEDLEDHPNVQKDLERLTQERIAHQRMGD
LEN,ligand,O=C1NC(=O)CCC1N1CC2=C(C1=O)C=CC=C2N
";

pub fn base_toml(extra_pipeline: &str) -> String {
    format!(
        r#"
[pipeline]
chunk_size = 2
devices = [0, 1]
max_retries = 1
dti_top_k = 5
docking_top_k = 3
mmgbsa_top_k = 2
consensus_constant = 60
{extra_pipeline}

[pipeline.stage_weights]
dti = 0.4
docking = 0.35
mmgbsa = 0.25

[inputs]
sequences = "inputs.csv"

[library]
proteins = [
    {{ id = "IKZF1", sequence = "MDADEGQDMSQVSGKESPPVSDTPDEGDEPMPIPEDLSTTSGGQQSSKSDRVVASNVKVETQSDEENGRACEMNGEECAEDLRMLDASGEKMNGSHRDQGSSALSGVGGIRLPNGKLKCDICGIICIGPNVLMVHKRSHTGERPFQCNQCGASFTQKGNLLRHIKLHSGEKPFKCHLCNYACRRRDALTGHLRTHSVGKPHKCGYCGRSYKQRSSLEEHKERCHNYLESMGLPGTLYPVIKEETNHSEMAEDLCKIGSERSLVLDRLASNVAKRKSSMPQKFLGDKGLSDTPYDSSASYEKENEMMKSHVMDQAINNAINYLGAESLRPLVQTPPGGSEVVPVISPMYQLHKPLAEGTPRSNHSAQDSAVENLLLLSKAKLVPSEREASPSNSCQDSTDTESNNEEQRSGLIYLTNHIAPHARNGLSLKEEHRAYDLLRAASENSQDALRVVSTSGEQMKVYKCEHCRVLFLDHVMYTIHMGCHGFRDPFECNMCGYHSQDRYEFSSHITRGEHRFHMS" }},
    {{ id = "IKZF3", sequence = "MEDIQTNAELKSTQEQSVPAESAAVLNDYSLTKSHEMENVDSGEGPANEDEDIGDDSMKVKDEYSERDENVLKSEPMGNAEEPEIPYSYSREYNEYENIKLERHVVSFDSSRPTSGKMNCDVCGLSCISFNVLMVHKRSHTGERPFQCNQCGASFTQKGNLLRHIKLHTGEKPFKCHLCNYACQRRDALTGHLRTHSVEKPYKCEFCGRSYKQRSSLEEHKERCRTFLQSTDPGDTASAEARHIKAEMGSERALVLDRLASNVAKRKSSMPQKFIGEKRHCFDVNYNSSYMYEKESELIQTRMMDQAINNAISYLGAEALRPLVQTPPAPTSEMVPVISSMYPIALTRAEMSNGAPQELEKKSIHLPEKSVPSERGLSPNNSGHDSTDTDSNHEERQNHIYQQNHMVLSRARNGMPLLKEVPRSYELLKPPPICPRDSVKVINKEGEVMDVYRCDHCRVLFLDYVMFTIHMGCHGFRDPFECNMCGYRSHDRYEFSSHIARGEHRALLK" }},
    {{ id = "GSPT1", sequence = "MDPGSGGGGGGGGGGGSSSGSSSSDSAPDCWDQADMEAPGPGPCGGGGSLAAAAEAQRENLSAAFSRQLNVNAKPFVPNVHAAEFVPSFLRGPAAPPPPAGGAANNHGAGSGAGGRAAPVESSQEEQSLCEGSNSAVSMELSEPIVENGETEMSPEESWEHKEEISEAEPGGGSLGDGRPPEESAHEMMEEEEEIPKPKSVVAPPGAPKKEHVNVVFIGHVDAGKSTIGGQIMYLTGMVDKRTLEKYEREAKEKNRETWYLSWALDTNQEERDKGKTVEVGRAYFETEKKHFTILDAPGHKSFVPNMIGGASQADLAVLVISARKGEFETGFEKGGQTREHAMLAKTAGVKHLIVLINKMDDPTVNWSNERYEECKEKLVPFLKKVGFNPKKDIHFMPCSGLTGANLKEQSDFCPWYIGLPFIPYLDNLPNFNRSVDGPIRLPIVDKYKDMGTVVLGKLESGSICKGQQLVMMPNKHNVEVLGILSDDVETDTVAPGENLKIRLKGIEEEEILPGFILCDPNNLCHSGRTFDAQIVIIEHKSIICPGYNAVLHIHTCIEEVEITALICLVDKKSGEKSKTRPRFVKQDQVCIARLRTAGTICLETFKDFPQMGRFTLRDEGKTIAIGKVLKLVPEKD" }},
    {{ id = "SALL4", sequence = "MSRRKQAKPQHINSEEDQGEQQPQQQTPEFADAAPAAPAAGELGAPVNHPGNDEVASEDEATVKRLRREETHVCEKCCAEFFSISEFLEHKKNCTKNPPVLIMNDSEGPVPSEDFSRAVLSHQLAGPQR" }},
]
ligands = [
    {{ id = "POM", smiles = "O=C1CCC(N2C(=O)C3=CC=CC(N)=C3C2=O)C(=O)N1" }},
    {{ id = "THAL", smiles = "O=C1CCC(N2C(=O)C3=CC=CC=C3C2=O)C(=O)N1" }},
    {{ id = "IBER", smiles = "O=C1CCC(N2CC3=C(OCC4=CC=C(CN5CCOCC5)C=C4)C=CC=C3C2=O)C(=O)N1" }},
    {{ id = "CC885", smiles = "CC1=C(Cl)C=CC(NC(=O)NCC2=CC=C3C(=O)N(C4CCC(=O)NC4=O)CC3=C2)=C1" }},
    {{ id = "VH032", smiles = "CC1=C(SC=N1)C1=CC=C(CNC(=O)C2CC(O)CN2C(=O)C(NC(C)=O)C(C)(C)C)C=C1" }},
    {{ id = "ASPIRIN", smiles = "CC(=O)OC1=CC=CC=C1C(=O)O" }},
    {{ id = "ETOH", smiles = "CCO" }},
    {{ id = "CAFF", smiles = "CN1C=NC2=C1C(=O)N(C(=O)N2C)C" }},
]

[paths]
workdir = "workspace"
"#
    )
}

/// Temporary project directory with a config, an input file and a workspace
pub struct Fixture {
    pub dir: TempDir,
    pub config_path: PathBuf,
    pub config: Config,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_pipeline("")
    }

    /// Extra `key = value` lines appended to the `[pipeline]` section
    pub fn with_pipeline(extra_pipeline: &str) -> Self {
        Self::from_toml(&base_toml(extra_pipeline))
    }

    /// Fixture around a complete config document
    pub fn from_toml(config_toml: &str) -> Self {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("inputs.csv"), INPUTS_CSV).unwrap();
        let config_path = dir.path().join("config.toml");
        std::fs::write(&config_path, config_toml).unwrap();
        let config = load_config(&config_path, Vec::<(String, String)>::new()).unwrap();
        Self {
            dir,
            config_path,
            config,
        }
    }

    pub fn workdir(&self) -> PathBuf {
        self.config.paths.workdir.clone()
    }
}
