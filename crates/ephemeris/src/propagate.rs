//! Element propagation and position assembly.

use lightlag_catalog::{Catalog, CelestialObject, OrbitalElements};
use lightlag_core::angles::normalize_degrees;
use lightlag_core::kepler;
use lightlag_core::units::km_to_au;
use lightlag_core::vector::Vector3;

use crate::EphemerisError;

/// Parent chains deeper than this indicate a mis-built catalog.
const MAX_PARENT_DEPTH: usize = 4;

/// Heliocentric ecliptic position in AU at `t` Julian centuries past J2000.
///
/// Parent-relative bodies (moons, near-body spacecraft) are resolved by
/// recursing through the parent chain and converting their local km orbit
/// to AU.
pub fn heliocentric_position(
    catalog: &Catalog,
    object: &CelestialObject,
    t: f64,
) -> Result<Vector3, EphemerisError> {
    position_with_depth(catalog, object, t, 0)
}

fn position_with_depth(
    catalog: &Catalog,
    object: &CelestialObject,
    t: f64,
    depth: usize,
) -> Result<Vector3, EphemerisError> {
    if depth > MAX_PARENT_DEPTH {
        return Err(EphemerisError::ParentChainTooDeep {
            body: object.name.clone(),
        });
    }

    match &object.parent {
        None => {
            if object.name.eq_ignore_ascii_case("sun") {
                return Ok(Vector3::ZERO);
            }
            Ok(orbital_position(&object.elements, t, false))
        }
        Some(parent_name) => {
            let parent = catalog
                .get(parent_name)
                .ok_or_else(|| EphemerisError::UnknownBody(parent_name.clone()))?;
            let parent_pos = position_with_depth(catalog, parent, t, depth + 1)?;
            let local_km = orbital_position(&object.elements, t, true);
            Ok(parent_pos.add(&local_km.scale(km_to_au(1.0))))
        }
    }
}

/// Position from one element set. Output units match `a` (AU heliocentric,
/// km parent-relative).
fn orbital_position(elements: &OrbitalElements, t: f64, parent_relative: bool) -> Vector3 {
    let a = elements.a + elements.da * t;
    let e = (elements.e + elements.de * t).max(0.0);
    let i = normalize_degrees(elements.i + elements.di * t).to_radians();
    let l = elements.l + elements.dl * t;
    let node = normalize_degrees(elements.n + elements.dn * t);

    // Heliocentric orbits carry the longitude of perihelion; parent-relative
    // orbits carry the argument of perigee directly.
    let (w_deg, mut m_deg) = if parent_relative {
        let w = normalize_degrees(elements.w + elements.dw * t);
        (w, l - w - node)
    } else {
        let lp = elements.lp + elements.dlp * t;
        (normalize_degrees(lp - node), l - lp)
    };

    m_deg += mean_anomaly_correction_deg(elements, t);

    // Hyperbolic mean anomaly is unbounded; only wrap the elliptic case.
    let m = if e < 1.0 {
        let wrapped = normalize_degrees(m_deg);
        let centered = if wrapped > 180.0 { wrapped - 360.0 } else { wrapped };
        centered.to_radians()
    } else {
        m_deg.to_radians()
    };

    let anomaly = kepler::solve(m, e);

    let (r, nu) = if e < 1.0 {
        let r = a * (1.0 - e * anomaly.cos());
        let nu = ((1.0 - e * e).sqrt() * anomaly.sin()).atan2(anomaly.cos() - e);
        (r, nu)
    } else {
        // a < 0 for hyperbolic orbits, so r comes out positive.
        let r = a * (1.0 - e * anomaly.cosh());
        let nu = ((e * e - 1.0).sqrt() * anomaly.sinh()).atan2(e - anomaly.cosh());
        (r, nu)
    };

    let x_orb = r * nu.cos();
    let y_orb = r * nu.sin();

    rotate_to_ecliptic(x_orb, y_orb, w_deg.to_radians(), i, node.to_radians())
}

/// Standish mean-anomaly correction, in degrees: `b·T² + c·cos(fT) + s·sin(fT)`.
fn mean_anomaly_correction_deg(elements: &OrbitalElements, t: f64) -> f64 {
    if elements.b == 0.0 && elements.c == 0.0 && elements.s == 0.0 {
        return 0.0;
    }
    let ft = (elements.f * t).to_radians();
    elements.b * t * t + elements.c * ft.cos() + elements.s * ft.sin()
}

/// Rotate orbital-plane coordinates by ω about z, i about x, Ω about z.
fn rotate_to_ecliptic(x: f64, y: f64, w: f64, i: f64, node: f64) -> Vector3 {
    let (sin_w, cos_w) = w.sin_cos();
    let (sin_i, cos_i) = i.sin_cos();
    let (sin_n, cos_n) = node.sin_cos();

    Vector3::new(
        (cos_w * cos_n - sin_w * sin_n * cos_i) * x + (-sin_w * cos_n - cos_w * sin_n * cos_i) * y,
        (cos_w * sin_n + sin_w * cos_n * cos_i) * x + (-sin_w * sin_n + cos_w * cos_n * cos_i) * y,
        sin_w * sin_i * x + cos_w * sin_i * y,
    )
}
