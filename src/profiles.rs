// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at http://mozilla.org/MPL/2.0/.

//! Mean wind, veer, turbulence standard deviation and spectrum models.
//!
//! Each model is a tagged variant: the IEC 61400-1 Ed. 3 closed form, a
//! data-interpolated form derived from the constraint channels, or a
//! user-supplied closed form. All evaluation happens in double precision;
//! parameters come from a typed [`IecContext`] record rather than loose
//! keyword arguments.

use std::str::FromStr;

use ndarray::prelude::*;
use thiserror::Error;

use crate::constants::{
    DEFAULT_ALPHA, DEFAULT_L_C, DEFAULT_U_REF, DEFAULT_Z_HUB, DEFAULT_Z_REF,
};
use crate::constraint::TimeConstraint;
use crate::grid::Component;

#[derive(Error, Debug)]
pub enum ProfileError {
    #[error("If profiles are interpolated from data, constraints must be given!")]
    InterpWithoutConstraints,

    #[error("Unknown profile type '{0}'; expected one of wsp, sig, spec")]
    UnknownInterpField(String),

    #[error("Cannot interpolate {what} from data: no constraint channels carry the {comp} component")]
    NoChannelsForComponent {
        what: &'static str,
        comp: Component,
    },
}

/// IEC turbulence class, setting the reference turbulence intensity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurbClass {
    A,
    B,
    C,
}

impl TurbClass {
    /// Reference turbulence intensity `I_ref`.
    pub fn i_ref(self) -> f64 {
        match self {
            TurbClass::A => 0.16,
            TurbClass::B => 0.14,
            TurbClass::C => 0.12,
        }
    }
}

impl FromStr for TurbClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "A" => Ok(TurbClass::A),
            "B" => Ok(TurbClass::B),
            "C" => Ok(TurbClass::C),
            other => Err(format!("Unrecognised turbulence class '{other}'")),
        }
    }
}

/// Physical parameters shared by the IEC profile and spectrum models.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IecContext {
    /// Reference mean wind speed \[m/s\].
    pub u_ref: f64,
    /// Reference height of the power-law profile \[m\].
    pub z_ref: f64,
    /// Power-law shear exponent.
    pub alpha: f64,
    pub turb_class: TurbClass,
    /// Hub height \[m\]; sets the Kaimal integral length scale.
    pub z_hub: f64,
    /// Coherence length scale \[m\].
    pub l_c: f64,
}

impl Default for IecContext {
    fn default() -> Self {
        IecContext {
            u_ref: DEFAULT_U_REF,
            z_ref: DEFAULT_Z_REF,
            alpha: DEFAULT_ALPHA,
            turb_class: TurbClass::B,
            z_hub: DEFAULT_Z_HUB,
            l_c: DEFAULT_L_C,
        }
    }
}

/// Power-law mean wind speed profile.
pub(crate) fn power_profile(ctx: &IecContext, z: f64) -> f64 {
    ctx.u_ref * (z / ctx.z_ref).powf(ctx.alpha)
}

/// IEC 61400-1 Ed. 3 turbulence standard deviation.
pub(crate) fn iec_sig(ctx: &IecContext, comp: Component) -> f64 {
    let sig1 = ctx.turb_class.i_ref() * (0.75 * ctx.u_ref + 5.6);
    let comp_factor = match comp {
        Component::U => 1.0,
        Component::V => 0.8,
        Component::W => 0.5,
    };
    sig1 * comp_factor
}

/// Kaimal integral length scale for a component \[m\].
pub(crate) fn kaimal_length(ctx: &IecContext, comp: Component) -> f64 {
    let lambda_1 = if ctx.z_hub < 60.0 {
        0.7 * ctx.z_hub
    } else {
        42.0
    };
    let factor = match comp {
        Component::U => 8.1,
        Component::V => 2.7,
        Component::W => 0.66,
    };
    factor * lambda_1
}

/// Kaimal spectrum normalized by the component variance, `S(f) / sigma^2`.
pub(crate) fn kaimal_spectrum(ctx: &IecContext, f: f64, comp: Component) -> f64 {
    let tau = kaimal_length(ctx, comp) / ctx.u_ref;
    4.0 * tau / (1.0 + 6.0 * f * tau).powf(5.0 / 3.0)
}

type WspFn = Box<dyn Fn(f64, f64) -> f64 + Send + Sync>;
type SigFn = Box<dyn Fn(Component, f64, f64) -> f64 + Send + Sync>;
type SpecFn = Box<dyn Fn(f64, Component, f64, f64) -> f64 + Send + Sync>;

/// Mean wind speed model `U(y, z)`.
pub enum WspProfile {
    /// `u_ref * (z / z_ref)^alpha`.
    PowerLaw,
    /// Interpolated over height from the constraint channel means.
    DataInterp,
    Custom(WspFn),
}

/// Veer model `V(y, z)`, added to the v-component columns.
pub enum VeerProfile {
    Zero,
    Custom(WspFn),
}

/// Turbulence standard deviation model `sigma(k, y, z)`.
pub enum SigProfile {
    /// IEC 61400-1 Ed. 3 class profile.
    Iec,
    /// Interpolated over height from the constraint channel standard
    /// deviations, per component.
    DataInterp,
    Custom(SigFn),
}

/// Turbulence power spectrum model `S(f, k, y, z)`.
pub enum SpecModel {
    /// Kaimal spectrum with component-specific integral length.
    Kaimal,
    /// Interpolated over height from the constraint channel spectra, per
    /// component.
    DataInterp,
    Custom(SpecFn),
}

macro_rules! impl_variant_debug {
    ($ty:ty, $($variant:ident),+) => {
        impl std::fmt::Debug for $ty {
            fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                match self {
                    $(Self::$variant { .. } => write!(f, concat!(stringify!($ty), "::", stringify!($variant))),)+
                }
            }
        }
    };
}

impl_variant_debug!(WspProfile, PowerLaw, DataInterp, Custom);
impl_variant_debug!(VeerProfile, Zero, Custom);
impl_variant_debug!(SigProfile, Iec, DataInterp, Custom);
impl_variant_debug!(SpecModel, Kaimal, DataInterp, Custom);

/// The profile models of a run. `None` fields fall back to the IEC defaults,
/// or to data interpolation where [`InterpData`] requests it.
#[derive(Debug, Default)]
pub struct Profiles {
    pub wsp: Option<WspProfile>,
    pub veer: Option<VeerProfile>,
    pub sig: Option<SigProfile>,
    pub spec: Option<SpecModel>,
}

/// Which profiles to interpolate from the constraint data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InterpData {
    None,
    All,
    Fields(Vec<InterpField>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InterpField {
    Wsp,
    Sig,
    Spec,
}

impl InterpData {
    fn includes(&self, field: InterpField) -> bool {
        match self {
            InterpData::None => false,
            InterpData::All => true,
            InterpData::Fields(fields) => fields.contains(&field),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, InterpData::None)
    }
}

impl FromStr for InterpData {
    type Err = ProfileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "none" => Ok(InterpData::None),
            "all" => Ok(InterpData::All),
            list => {
                let fields = list
                    .split(',')
                    .map(|f| match f.trim() {
                        "wsp" => Ok(InterpField::Wsp),
                        "sig" => Ok(InterpField::Sig),
                        "spec" => Ok(InterpField::Spec),
                        other => Err(ProfileError::UnknownInterpField(other.to_string())),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(InterpData::Fields(fields))
            }
        }
    }
}

/// A height table with numpy-interp semantics: linear between knots, clamped
/// beyond the ends.
#[derive(Debug, Clone)]
pub(crate) struct ZTable {
    z: Vec<f64>,
    v: Vec<f64>,
}

impl ZTable {
    fn new(mut pairs: Vec<(f64, f64)>) -> ZTable {
        pairs.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        ZTable {
            z: pairs.iter().map(|p| p.0).collect(),
            v: pairs.iter().map(|p| p.1).collect(),
        }
    }

    pub(crate) fn interp(&self, z: f64) -> f64 {
        let n = self.z.len();
        if z <= self.z[0] {
            return self.v[0];
        }
        if z >= self.z[n - 1] {
            return self.v[n - 1];
        }
        let i = self.z.partition_point(|&zk| zk <= z);
        let (z0, z1) = (self.z[i - 1], self.z[i]);
        let (v0, v1) = (self.v[i - 1], self.v[i]);
        if z1 == z0 {
            v0
        } else {
            v0 + (v1 - v0) * (z - z0) / (z1 - z0)
        }
    }
}

/// Per-component table of one-sided spectra over height: row `i` holds the
/// channel spectra at frequency index `i`.
#[derive(Debug, Clone)]
struct SpecTable {
    z: Vec<f64>,
    /// Shape `(n_f, n_chan)`, channel columns sorted by height.
    s: Array2<f64>,
}

impl SpecTable {
    fn interp_row(&self, i_f: usize, z: f64) -> f64 {
        let n = self.z.len();
        if z <= self.z[0] {
            return self.s[[i_f, 0]];
        }
        if z >= self.z[n - 1] {
            return self.s[[i_f, n - 1]];
        }
        let i = self.z.partition_point(|&zk| zk <= z);
        let (z0, z1) = (self.z[i - 1], self.z[i]);
        let (v0, v1) = (self.s[[i_f, i - 1]], self.s[[i_f, i]]);
        if z1 == z0 {
            v0
        } else {
            v0 + (v1 - v0) * (z - z0) / (z1 - z0)
        }
    }
}

enum ResolvedWsp {
    PowerLaw,
    Table(ZTable),
    Custom(WspFn),
}

impl std::fmt::Debug for ResolvedWsp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolvedWsp::PowerLaw => f.write_str("PowerLaw"),
            ResolvedWsp::Table(t) => f.debug_tuple("Table").field(t).finish(),
            ResolvedWsp::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

enum ResolvedVeer {
    Zero,
    Custom(WspFn),
}

impl std::fmt::Debug for ResolvedVeer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolvedVeer::Zero => f.write_str("Zero"),
            ResolvedVeer::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

enum ResolvedSig {
    Iec,
    Tables(Box<[Option<ZTable>; 3]>),
    Custom(SigFn),
}

impl std::fmt::Debug for ResolvedSig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolvedSig::Iec => f.write_str("Iec"),
            ResolvedSig::Tables(t) => f.debug_tuple("Tables").field(t).finish(),
            ResolvedSig::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

enum ResolvedSpec {
    Kaimal,
    Tables(Box<[Option<SpecTable>; 3]>),
    Custom(SpecFn),
}

impl std::fmt::Debug for ResolvedSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResolvedSpec::Kaimal => f.write_str("Kaimal"),
            ResolvedSpec::Tables(t) => f.debug_tuple("Tables").field(t).finish(),
            ResolvedSpec::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Profile models with any data interpolation already baked into tables.
#[derive(Debug)]
pub(crate) struct ResolvedProfiles {
    wsp: ResolvedWsp,
    veer: ResolvedVeer,
    sig: ResolvedSig,
    spec: ResolvedSpec,
}

impl ResolvedProfiles {
    pub(crate) fn wsp(&self, ctx: &IecContext, y: f64, z: f64) -> f64 {
        match &self.wsp {
            ResolvedWsp::PowerLaw => power_profile(ctx, z),
            ResolvedWsp::Table(t) => t.interp(z),
            ResolvedWsp::Custom(f) => f(y, z),
        }
    }

    pub(crate) fn veer(&self, _ctx: &IecContext, y: f64, z: f64) -> f64 {
        match &self.veer {
            ResolvedVeer::Zero => 0.0,
            ResolvedVeer::Custom(f) => f(y, z),
        }
    }

    pub(crate) fn sig(&self, ctx: &IecContext, comp: Component, y: f64, z: f64) -> f64 {
        match &self.sig {
            ResolvedSig::Iec => iec_sig(ctx, comp),
            // Resolution guarantees a table for every component in the run.
            ResolvedSig::Tables(tables) => tables[comp.index()]
                .as_ref()
                .map(|t| t.interp(z))
                .unwrap_or_else(|| iec_sig(ctx, comp)),
            ResolvedSig::Custom(f) => f(comp, y, z),
        }
    }

    /// The spectrum sampled on the run's frequency grid.
    pub(crate) fn spectrum_column(
        &self,
        ctx: &IecContext,
        freqs: &[f64],
        comp: Component,
        y: f64,
        z: f64,
    ) -> Vec<f64> {
        match &self.spec {
            ResolvedSpec::Kaimal => freqs
                .iter()
                .map(|&f| kaimal_spectrum(ctx, f, comp))
                .collect(),
            ResolvedSpec::Tables(tables) => match tables[comp.index()].as_ref() {
                Some(t) => (0..freqs.len()).map(|i_f| t.interp_row(i_f, z)).collect(),
                None => freqs
                    .iter()
                    .map(|&f| kaimal_spectrum(ctx, f, comp))
                    .collect(),
            },
            ResolvedSpec::Custom(f) => freqs.iter().map(|&fr| f(fr, comp, y, z)).collect(),
        }
    }
}

/// Apply the defaulting and interpolation rules: an explicit model always
/// wins; otherwise [`InterpData`] may select data interpolation; otherwise
/// the IEC closed forms apply.
pub(crate) fn resolve_profiles(
    profiles: Profiles,
    interp: &InterpData,
    con_tc: Option<&TimeConstraint>,
    needed_comps: &[Component],
    t_total: f64,
) -> Result<ResolvedProfiles, ProfileError> {
    if !interp.is_none() && con_tc.is_none() {
        return Err(ProfileError::InterpWithoutConstraints);
    }

    let Profiles {
        wsp,
        veer,
        sig,
        spec,
    } = profiles;

    let wsp = match wsp {
        None if interp.includes(InterpField::Wsp) => Some(WspProfile::DataInterp),
        other => other,
    };
    let wsp = match wsp.unwrap_or(WspProfile::PowerLaw) {
        WspProfile::PowerLaw => ResolvedWsp::PowerLaw,
        WspProfile::Custom(f) => ResolvedWsp::Custom(f),
        WspProfile::DataInterp => {
            let con = con_tc.ok_or(ProfileError::InterpWithoutConstraints)?;
            ResolvedWsp::Table(mean_table(con, Component::U, "the mean wind speed")?)
        }
    };

    let veer = match veer.unwrap_or(VeerProfile::Zero) {
        VeerProfile::Zero => ResolvedVeer::Zero,
        VeerProfile::Custom(f) => ResolvedVeer::Custom(f),
    };

    let sig = match sig {
        None if interp.includes(InterpField::Sig) => Some(SigProfile::DataInterp),
        other => other,
    };
    let sig = match sig.unwrap_or(SigProfile::Iec) {
        SigProfile::Iec => ResolvedSig::Iec,
        SigProfile::Custom(f) => ResolvedSig::Custom(f),
        SigProfile::DataInterp => {
            let con = con_tc.ok_or(ProfileError::InterpWithoutConstraints)?;
            ResolvedSig::Tables(Box::new(sig_tables(con, needed_comps)?))
        }
    };

    let spec = match spec {
        None if interp.includes(InterpField::Spec) => Some(SpecModel::DataInterp),
        other => other,
    };
    let spec = match spec.unwrap_or(SpecModel::Kaimal) {
        SpecModel::Kaimal => ResolvedSpec::Kaimal,
        SpecModel::Custom(f) => ResolvedSpec::Custom(f),
        SpecModel::DataInterp => {
            let con = con_tc.ok_or(ProfileError::InterpWithoutConstraints)?;
            ResolvedSpec::Tables(Box::new(spec_tables(con, needed_comps, t_total)?))
        }
    };

    Ok(ResolvedProfiles {
        wsp,
        veer,
        sig,
        spec,
    })
}

fn mean_table(
    con: &TimeConstraint,
    comp: Component,
    what: &'static str,
) -> Result<ZTable, ProfileError> {
    let means = con.channel_means();
    let pairs: Vec<(f64, f64)> = con
        .points()
        .iter()
        .zip(means)
        .filter(|(p, _)| p.comp == comp)
        .map(|(p, m)| (p.z, m))
        .collect();
    if pairs.is_empty() {
        return Err(ProfileError::NoChannelsForComponent { what, comp });
    }
    Ok(ZTable::new(pairs))
}

fn sig_tables(
    con: &TimeConstraint,
    needed_comps: &[Component],
) -> Result<[Option<ZTable>; 3], ProfileError> {
    let stds = con.channel_stds();
    let mut tables: [Option<ZTable>; 3] = [None, None, None];
    for comp in Component::ALL {
        let pairs: Vec<(f64, f64)> = con
            .points()
            .iter()
            .zip(stds.iter())
            .filter(|(p, _)| p.comp == comp)
            .map(|(p, &s)| (p.z, s))
            .collect();
        if pairs.is_empty() {
            if needed_comps.contains(&comp) {
                return Err(ProfileError::NoChannelsForComponent {
                    what: "the standard deviation",
                    comp,
                });
            }
        } else {
            tables[comp.index()] = Some(ZTable::new(pairs));
        }
    }
    Ok(tables)
}

fn spec_tables(
    con: &TimeConstraint,
    needed_comps: &[Component],
    t_total: f64,
) -> Result<[Option<SpecTable>; 3], ProfileError> {
    // One-sided power spectral density per channel: 2 T |c|^2 with
    // c = fft / n_t. The overall scale cancels in the magnitude rescale;
    // the spectral shape is what is interpolated.
    let fft = con.time_fft();
    let mut tables: [Option<SpecTable>; 3] = [None, None, None];
    for comp in Component::ALL {
        let mut cols: Vec<(f64, usize)> = con
            .points()
            .iter()
            .enumerate()
            .filter(|(_, p)| p.comp == comp)
            .map(|(i, p)| (p.z, i))
            .collect();
        if cols.is_empty() {
            if needed_comps.contains(&comp) {
                return Err(ProfileError::NoChannelsForComponent {
                    what: "the power spectrum",
                    comp,
                });
            }
            continue;
        }
        cols.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        let n_f = fft.nrows();
        let mut s = Array2::zeros((n_f, cols.len()));
        for (j, &(_, i_chan)) in cols.iter().enumerate() {
            for i_f in 0..n_f {
                s[[i_f, j]] = 2.0 * t_total * fft[[i_f, i_chan]].norm_sqr();
            }
        }
        tables[comp.index()] = Some(SpecTable {
            z: cols.iter().map(|c| c.0).collect(),
            s,
        });
    }
    Ok(tables)
}
