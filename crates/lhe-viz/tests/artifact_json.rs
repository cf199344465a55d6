//! JSON round trip of histogram artifacts built from compiled definitions.

use lhe_core::{
    Event, FourVector, HistogramRegistry, HistogramSpec, IdSet, Normalization, Particle,
    compile_histograms, fill_event,
};
use lhe_viz::{HistogramKind, HistogramsArtifact};

fn filled_registry() -> (HistogramRegistry, Vec<lhe_core::HistogramDef>) {
    let mut mll = HistogramSpec::one_d("mll", &[13, -13], "pair", "(X+Y).M()", 10, 0.0, 40.0);
    mll.xlabel = "m_{#mu#mu}".into();
    mll.unit = "GeV".into();
    let mut pt_eta = HistogramSpec::two_d(
        "pt_eta",
        &[13, -13],
        "X.Pt()",
        "X.Eta()",
        (10, 0.0, 100.0),
        (4, -2.0, 2.0),
    );
    pt_eta.ylabel = "#eta".into();
    let defs = compile_histograms(&[mll, pt_eta]).unwrap();

    let include: IdSet = [13, -13].into_iter().collect();
    let mut reg = HistogramRegistry::build(&defs, &include, Some("dy"));
    let ev = Event::new(vec![
        Particle::new(13, FourVector::new(10.0, 0.0, 0.0, 10.0)),
        Particle::new(-13, FourVector::new(-10.0, 0.0, 0.0, 10.0)),
    ]);
    for _ in 0..3 {
        fill_event(&mut reg, &ev, &defs, Some("dy"), 0.25, 6500.0).unwrap();
    }
    (reg, defs)
}

#[test]
fn json_round_trip_is_lossless() {
    let (reg, defs) = filled_registry();
    let art = HistogramsArtifact::from_run(
        &reg,
        &defs,
        Normalization::CrossSection { lumi: 139.0 },
        &[],
    )
    .unwrap();

    let json = serde_json::to_string_pretty(&art).unwrap();
    let back: HistogramsArtifact = serde_json::from_str(&json).unwrap();
    assert_eq!(back, art);
    assert_eq!(back.to_registry().unwrap(), reg);
}

#[test]
fn json_layout_is_plot_friendly() {
    let (reg, defs) = filled_registry();
    let art = HistogramsArtifact::from_run(&reg, &defs, Normalization::Unit, &[]).unwrap();
    let v = serde_json::to_value(&art).unwrap();

    assert_eq!(v["schema_version"], "lheplot.histograms.v1");
    assert_eq!(v["meta"]["tool"], "lheplot");
    assert_eq!(v["meta"]["normalized"], false);
    assert!(v["meta"].get("lumi").is_none());

    let mll = &v["histograms"][0];
    assert_eq!(mll["key"], "mll__dy");
    assert_eq!(mll["kind"], "h1");
    assert_eq!(mll["x"]["label"], "m_{#mu#mu}");
    assert_eq!(mll["x"]["unit"], "GeV");
    assert_eq!(mll["x"]["edges"].as_array().unwrap().len(), 11);
    assert_eq!(mll["content"][5], 0.75);
    assert_eq!(mll["entries"], 3);
    assert!(mll.get("y").is_none());

    let h2 = &art.histograms[1];
    assert_eq!(h2.kind, HistogramKind::H2);
    assert_eq!(h2.y.as_ref().unwrap().label, "#eta");
    // Both muons have pt 10 and eta 0: x bin 1, y bin 2.
    assert_eq!(h2.content[2 * 10 + 1], 1.5);
}

#[test]
fn json_round_trip_keeps_non_dyadic_weights_exact() {
    let spec = HistogramSpec::one_d("pt", &[13], "single", "X.Pt()", 3, 0.0, 3.0);
    let defs = compile_histograms(&[spec]).unwrap();
    let include: IdSet = [13].into_iter().collect();
    let mut reg = HistogramRegistry::build(&defs, &include, Some("dy"));
    for seed in 1..500u32 {
        // cross_section * lumi / total, e.g. 20 / 52.
        let w = 20.0 / f64::from(7 * seed + 3);
        let ev = Event::new(vec![Particle::new(
            13,
            FourVector::new(f64::from(seed % 3) + 0.5, 0.0, 0.0, 3.0),
        )]);
        fill_event(&mut reg, &ev, &defs, Some("dy"), w, 6500.0).unwrap();
    }

    let art = HistogramsArtifact::from_run(
        &reg,
        &defs,
        Normalization::CrossSection { lumi: 20.0 },
        &[],
    )
    .unwrap();
    let json = serde_json::to_string_pretty(&art).unwrap();
    let back: HistogramsArtifact = serde_json::from_str(&json).unwrap();
    assert_eq!(back, art);
    assert_eq!(back.to_registry().unwrap(), reg);

    let single = 20.0_f64 / 52.0;
    let text = serde_json::to_string(&single).unwrap();
    assert_eq!(serde_json::from_str::<f64>(&text).unwrap().to_bits(), single.to_bits());
}
