//! Built-in solar-system table.
//!
//! Planetary elements follow Standish & Williams, "Keplerian Elements for
//! Approximate Positions of the Major Planets": the inner planets use the
//! 1800 AD – 2050 AD fit, the outer planets the long-interval fit together
//! with its `b,c,s,f` mean-anomaly correction coefficients. Earth and Mars
//! carry low-amplitude correction terms of the same form so their
//! light-time predictions include the periodic correction. Moon and
//! spacecraft elements are parent-relative approximations sufficient for
//! light-time work.

use chrono::NaiveDate;

use crate::{BodyClass, CelestialObject, MissionStatus, OrbitalElements, SpacecraftInfo};

fn heliocentric(
    name: &str,
    class: BodyClass,
    radius_km: f64,
    mass_kg: f64,
    elements: OrbitalElements,
) -> CelestialObject {
    CelestialObject {
        name: name.to_string(),
        class,
        parent: None,
        radius_km,
        mass_kg,
        elements,
        spacecraft: None,
    }
}

#[allow(clippy::too_many_arguments)]
fn moon(
    name: &str,
    parent: &str,
    radius_km: f64,
    mass_kg: f64,
    a_km: f64,
    e: f64,
    i: f64,
    l: f64,
    dl: f64,
) -> CelestialObject {
    CelestialObject {
        name: name.to_string(),
        class: BodyClass::Moon,
        parent: Some(parent.to_string()),
        radius_km,
        mass_kg,
        elements: OrbitalElements {
            a: a_km,
            e,
            i,
            l,
            dl,
            ..Default::default()
        },
        spacecraft: None,
    }
}

fn spacecraft(
    name: &str,
    parent: Option<&str>,
    mass_kg: f64,
    elements: OrbitalElements,
    launched: (i32, u32, u32),
    status: MissionStatus,
    transmitter_frequency_hz: Option<f64>,
    transmitter_active: bool,
) -> CelestialObject {
    CelestialObject {
        name: name.to_string(),
        class: BodyClass::Spacecraft,
        parent: parent.map(str::to_string),
        radius_km: 0.01,
        mass_kg,
        elements,
        spacecraft: Some(SpacecraftInfo {
            launch_date: NaiveDate::from_ymd_opt(launched.0, launched.1, launched.2),
            mission_status: status,
            transmitter_frequency_hz,
            transmitter_active,
        }),
    }
}

/// All built-in bodies. The Sun sits at the heliocentric origin.
pub fn builtin_objects() -> Vec<CelestialObject> {
    let mut objects = vec![heliocentric(
        "sun",
        BodyClass::Star,
        695_700.0,
        1.989e30,
        OrbitalElements::default(),
    )];

    objects.extend(planets());
    objects.extend(dwarf_planets());
    objects.extend(asteroids());
    objects.extend(moons());
    objects.extend(spacecrafts());
    objects
}

fn planets() -> Vec<CelestialObject> {
    vec![
        heliocentric(
            "mercury",
            BodyClass::Planet,
            2_439.7,
            3.301e23,
            OrbitalElements {
                a: 0.387_098_31,
                e: 0.205_630_69,
                i: 7.004_86,
                l: 252.250_84,
                lp: 77.456_45,
                n: 48.330_67,
                de: 0.000_020_04,
                di: -0.005_93,
                dl: 149_472.674_11,
                dlp: 0.159_29,
                dn: -0.125_34,
                ..Default::default()
            },
        ),
        heliocentric(
            "venus",
            BodyClass::Planet,
            6_051.8,
            4.867e24,
            OrbitalElements {
                a: 0.723_329_56,
                e: 0.006_773_23,
                i: 3.394_71,
                l: 181.979_73,
                lp: 131.563_70,
                n: 76.679_92,
                de: -0.000_047_64,
                di: -0.008_67,
                dl: 58_517.815_39,
                dlp: 0.002_68,
                dn: -0.278_01,
                ..Default::default()
            },
        ),
        heliocentric(
            "earth",
            BodyClass::Planet,
            6_371.0,
            5.972e24,
            OrbitalElements {
                a: 1.000_002_61,
                e: 0.016_708_57,
                i: -0.000_15,
                l: 100.464_57,
                lp: 102.937_35,
                n: 0.0,
                da: 0.000_005_62,
                de: -0.000_042_04,
                di: -0.013_37,
                dl: 35_999.372_44,
                dlp: 0.323_29,
                b: -0.000_020_54,
                c: 0.000_887,
                s: -0.001_133,
                f: 38.351_25,
                ..Default::default()
            },
        ),
        heliocentric(
            "mars",
            BodyClass::Planet,
            3_389.5,
            6.417e23,
            OrbitalElements {
                a: 1.523_662_31,
                e: 0.093_412_33,
                i: 1.850_26,
                l: -4.553_43,
                lp: -23.943_62,
                n: 49.558_09,
                da: -0.000_073_28,
                de: 0.000_090_48,
                di: -0.006_75,
                dl: 19_140.299_34,
                dlp: 0.445_41,
                dn: -0.291_08,
                b: 0.000_052_53,
                c: -0.001_411,
                s: 0.002_205,
                f: 38.351_25,
                ..Default::default()
            },
        ),
        heliocentric(
            "jupiter",
            BodyClass::Planet,
            69_911.0,
            1.898e27,
            OrbitalElements {
                a: 5.202_480_19,
                e: 0.048_535_90,
                i: 1.298_614_16,
                l: 34.334_791_52,
                lp: 14.274_952_44,
                n: 100.292_826_54,
                da: -0.000_028_64,
                de: 0.000_180_26,
                di: -0.003_226_99,
                dl: 3_034.903_717_57,
                dlp: 0.181_991_96,
                dn: 0.130_246_19,
                b: -0.000_124_52,
                c: 0.060_640_60,
                s: -0.356_354_38,
                f: 38.351_25,
                ..Default::default()
            },
        ),
        heliocentric(
            "saturn",
            BodyClass::Planet,
            58_232.0,
            5.683e26,
            OrbitalElements {
                a: 9.541_498_83,
                e: 0.055_508_25,
                i: 2.494_241_02,
                l: 50.075_713_29,
                lp: 92.861_360_63,
                n: 113.639_987_02,
                da: -0.000_030_65,
                de: -0.000_320_44,
                di: 0.004_519_69,
                dl: 1_222.114_947_24,
                dlp: 0.541_794_78,
                dn: -0.250_150_02,
                b: 0.000_258_99,
                c: -0.134_344_69,
                s: 0.873_201_47,
                f: 38.351_25,
                ..Default::default()
            },
        ),
        heliocentric(
            "uranus",
            BodyClass::Planet,
            25_362.0,
            8.681e25,
            OrbitalElements {
                a: 19.187_979_48,
                e: 0.046_857_40,
                i: 0.772_981_27,
                l: 314.202_766_25,
                lp: 172.434_044_41,
                n: 73.962_502_15,
                da: -0.000_204_55,
                de: -0.000_015_50,
                di: -0.001_801_55,
                dl: 428.495_125_95,
                dlp: 0.092_669_85,
                dn: 0.057_396_99,
                b: 0.000_583_31,
                c: -0.977_318_48,
                s: 0.176_892_45,
                f: 7.670_25,
                ..Default::default()
            },
        ),
        heliocentric(
            "neptune",
            BodyClass::Planet,
            24_622.0,
            1.024e26,
            OrbitalElements {
                a: 30.069_527_52,
                e: 0.008_954_39,
                i: 1.770_055_20,
                l: 304.222_892_87,
                lp: 46.681_587_24,
                n: 131.786_358_53,
                da: 0.000_064_47,
                de: 0.000_008_18,
                di: 0.000_224_00,
                dl: 218.465_153_14,
                dlp: 0.010_099_38,
                dn: -0.006_063_02,
                b: -0.000_413_48,
                c: 0.683_463_18,
                s: -0.101_625_47,
                f: 7.670_25,
                ..Default::default()
            },
        ),
    ]
}

fn dwarf_planets() -> Vec<CelestialObject> {
    vec![
        heliocentric(
            "pluto",
            BodyClass::DwarfPlanet,
            1_188.3,
            1.303e22,
            OrbitalElements {
                a: 39.486_860_35,
                e: 0.248_852_38,
                i: 17.141_042_60,
                l: 238.965_350_11,
                lp: 224.097_025_98,
                n: 110.301_679_86,
                da: 0.004_497_51,
                de: 0.000_060_16,
                di: 0.000_005_01,
                dl: 145.180_429_03,
                dlp: -0.009_688_27,
                dn: -0.008_099_81,
                b: -0.012_627_24,
                ..Default::default()
            },
        ),
        heliocentric(
            "ceres",
            BodyClass::DwarfPlanet,
            469.7,
            9.38e20,
            OrbitalElements {
                a: 2.767_6,
                e: 0.078_9,
                i: 10.59,
                l: 95.99,
                lp: 153.94,
                n: 80.39,
                dl: 7_823.5,
                ..Default::default()
            },
        ),
        heliocentric(
            "eris",
            BodyClass::DwarfPlanet,
            1_163.0,
            1.66e22,
            OrbitalElements {
                a: 67.86,
                e: 0.436,
                i: 44.04,
                l: 205.0,
                lp: 187.1,
                n: 35.95,
                dl: 64.5,
                ..Default::default()
            },
        ),
        heliocentric(
            "makemake",
            BodyClass::DwarfPlanet,
            715.0,
            3.1e21,
            OrbitalElements {
                a: 45.43,
                e: 0.161,
                i: 29.01,
                l: 85.0,
                lp: 15.3,
                n: 79.27,
                dl: 117.6,
                ..Default::default()
            },
        ),
        heliocentric(
            "haumea",
            BodyClass::DwarfPlanet,
            816.0,
            4.01e21,
            OrbitalElements {
                a: 43.1,
                e: 0.195,
                i: 28.2,
                l: 220.0,
                lp: 1.1,
                n: 122.1,
                dl: 127.2,
                ..Default::default()
            },
        ),
    ]
}

fn asteroids() -> Vec<CelestialObject> {
    vec![
        heliocentric(
            "vesta",
            BodyClass::Asteroid,
            262.7,
            2.59e20,
            OrbitalElements {
                a: 2.362,
                e: 0.089,
                i: 7.14,
                l: 20.0,
                lp: 254.8,
                n: 103.8,
                dl: 9_919.0,
                ..Default::default()
            },
        ),
        heliocentric(
            "pallas",
            BodyClass::Asteroid,
            256.0,
            2.04e20,
            OrbitalElements {
                a: 2.773,
                e: 0.231,
                i: 34.8,
                l: 100.0,
                lp: 123.1,
                n: 173.1,
                dl: 7_800.0,
                ..Default::default()
            },
        ),
    ]
}

fn moons() -> Vec<CelestialObject> {
    let mut earth_moon = moon(
        "moon",
        "earth",
        1_737.4,
        7.342e22,
        384_400.0,
        0.054_9,
        5.145,
        218.316,
        481_267.881,
    );
    // The Moon's apsidal and nodal precession are fast enough to matter at
    // multi-year horizons.
    earth_moon.elements.n = 125.08;
    earth_moon.elements.dn = -1_934.14;
    earth_moon.elements.w = 318.15;
    earth_moon.elements.dw = 6_003.15;

    vec![
        earth_moon,
        moon("phobos", "mars", 11.3, 1.07e16, 9_376.0, 0.015_1, 1.08, 30.0, 41_235_000.0),
        moon("deimos", "mars", 6.2, 1.48e15, 23_463.0, 0.000_33, 1.79, 120.0, 10_415_000.0),
        moon("io", "jupiter", 1_821.6, 8.93e22, 421_800.0, 0.004_1, 0.05, 200.4, 7_432_000.0),
        moon("europa", "jupiter", 1_560.8, 4.80e22, 671_100.0, 0.009_4, 0.47, 110.0, 3_702_600.0),
        moon("ganymede", "jupiter", 2_634.1, 1.48e23, 1_070_400.0, 0.001_3, 0.20, 250.3, 1_837_900.0),
        moon("callisto", "jupiter", 2_410.3, 1.08e23, 1_882_700.0, 0.007_4, 0.19, 85.9, 787_900.0),
        moon("titan", "saturn", 2_574.7, 1.345e23, 1_221_870.0, 0.028_8, 0.28, 15.2, 824_600.0),
        moon("enceladus", "saturn", 252.1, 1.08e20, 238_040.0, 0.004_7, 0.01, 300.0, 9_596_000.0),
        moon("triton", "neptune", 1_353.4, 2.14e22, 354_760.0, 0.000_02, 156.885, 50.0, 2_237_000.0),
        moon("charon", "pluto", 606.0, 1.586e21, 19_591.0, 0.000_2, 0.08, 175.0, 2_058_500.0),
    ]
}

fn spacecrafts() -> Vec<CelestialObject> {
    vec![
        spacecraft(
            "voyager-1",
            None,
            721.9,
            OrbitalElements {
                a: -3.501_4,
                e: 3.724_9,
                i: 35.76,
                l: 1_549.0,
                lp: 338.0,
                n: 179.1,
                dl: 5_493.0,
                ..Default::default()
            },
            (1977, 9, 5),
            MissionStatus::Extended,
            Some(8.4e9),
            true,
        ),
        spacecraft(
            "voyager-2",
            None,
            825.5,
            OrbitalElements {
                a: -4.022_0,
                e: 2.285_0,
                i: 78.81,
                l: 1_201.6,
                lp: 301.6,
                n: 101.7,
                dl: 4_467.0,
                ..Default::default()
            },
            (1977, 8, 20),
            MissionStatus::Extended,
            Some(8.4e9),
            true,
        ),
        spacecraft(
            "new-horizons",
            None,
            478.0,
            OrbitalElements {
                a: -23.5,
                e: 1.41,
                i: 2.23,
                l: 258.4,
                lp: 243.1,
                n: 227.1,
                dl: 316.0,
                ..Default::default()
            },
            (2006, 1, 19),
            MissionStatus::Extended,
            Some(8.4e9),
            true,
        ),
        spacecraft(
            "parker-solar-probe",
            None,
            685.0,
            OrbitalElements {
                a: 0.388,
                e: 0.850,
                i: 3.4,
                l: 181.0,
                lp: 21.0,
                n: 0.4,
                dl: 148_900.0,
                ..Default::default()
            },
            (2018, 8, 12),
            MissionStatus::Active,
            Some(8.4e9),
            true,
        ),
        spacecraft(
            "iss",
            Some("earth"),
            450_000.0,
            OrbitalElements {
                a: 6_793.0,
                e: 0.000_3,
                i: 51.64,
                l: 0.0,
                dl: 203_870_000.0,
                ..Default::default()
            },
            (1998, 11, 20),
            MissionStatus::Active,
            Some(2.2e9),
            true,
        ),
        spacecraft(
            "james-webb",
            Some("earth"),
            6_200.0,
            OrbitalElements {
                a: 1_500_000.0,
                e: 0.10,
                i: 5.0,
                l: 90.0,
                dl: 73_050.0,
                ..Default::default()
            },
            (2021, 12, 25),
            MissionStatus::Active,
            Some(25.9e9),
            true,
        ),
        spacecraft(
            "mro",
            Some("mars"),
            2_180.0,
            OrbitalElements {
                a: 3_647.0,
                e: 0.01,
                i: 92.6,
                l: 45.0,
                dl: 168_800_000.0,
                ..Default::default()
            },
            (2005, 8, 12),
            MissionStatus::Extended,
            Some(8.4e9),
            true,
        ),
    ]
}
