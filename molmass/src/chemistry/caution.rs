//! Advisory caution statements for symbol sequences that read two ways,
//! e.g. `Co` (cobalt) versus `CO` (carbon monoxide). These never block a
//! computation; they are attached to the successful result.

/// Look up the caution statement for a resolved symbol token, if any.
pub(crate) fn caution_for(token: &str) -> Option<&'static str> {
    CAUTIONS
        .iter()
        .find(|(symbol, _)| *symbol == token)
        .map(|(_, statement)| *statement)
}

const CAUTIONS: &[(&str, &str)] = &[
    ("Bi", "Bi means bismuth; BI means boron-iodine."),
    ("Bk", "Bk means berkelium; BK means boron-potassium."),
    ("Bu", "Bu means the butyl group; BU means boron-uranium."),
    ("Cd", "Cd means cadmium; CD means carbon-deuterium."),
    ("Cf", "Cf means californium; CF means carbon-fluorine."),
    ("Co", "Co means cobalt; CO means carbon-oxygen."),
    ("Cs", "Cs means cesium; CS means carbon-sulfur."),
    ("Cu", "Cu means copper; CU means carbon-uranium."),
    ("Dy", "Dy means dysprosium; DY means deuterium-yttrium."),
    ("Hf", "Hf means hafnium; HF means hydrogen-fluorine."),
    ("Ho", "Ho means holmium; HO means hydrogen-oxygen."),
    ("In", "In means indium; IN means iodine-nitrogen."),
    ("Nb", "Nb means niobium; NB means nitrogen-boron."),
    ("Nd", "Nd means neodymium; ND means nitrogen-deuterium."),
    ("Ni", "Ni means nickel; NI means nitrogen-iodine."),
    ("No", "No means nobelium; NO means nitrogen-oxygen."),
    ("Np", "Np means neptunium; NP means nitrogen-phosphorus."),
    ("Os", "Os means osmium; OS means oxygen-sulfur."),
    ("Pd", "Pd means palladium; PD means phosphorus-deuterium."),
    ("Ph", "Ph means the phenyl group; PH means phosphorus-hydrogen."),
    ("Pu", "Pu means plutonium; PU means phosphorus-uranium."),
    ("Py", "Py means the pyridine group; PY means phosphorus-yttrium."),
    ("Sb", "Sb means antimony; SB means sulfur-boron."),
    ("Sc", "Sc means scandium; SC means sulfur-carbon."),
    ("Si", "Si means silicon; SI means sulfur-iodine."),
    ("Sn", "Sn means tin; SN means sulfur-nitrogen."),
    ("Yb", "Yb means ytterbium; YB means yttrium-boron."),
    (
        "Bpy",
        "Bpy means the bipyridine group; BPY means boron-phosphorus-yttrium.",
    ),
];

#[test]
fn lookup() {
    assert!(caution_for("Co").is_some());
    assert!(caution_for("C").is_none());
    assert!(caution_for("Bpy").is_some());
}
